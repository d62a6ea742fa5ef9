// Copyright 2025 The Got Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Mutable ref pointers into the immutable object graph.
//!
//! The engine only needs the small [`RefStore`] surface; the loose-file
//! implementation here is what a repository uses, and the in-memory one
//! backs tests. Local updates are last-writer-wins; compare-and-swap
//! discipline belongs to the remote.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use crate::error::GotError;
use crate::error::GotResult;
use crate::file_util::IoResultExt as _;
use crate::file_util::persist_content_addressed_temp_file;
use crate::object_id::ObjectHash;

/// Ref resolution as the sync engine and GC consume it.
pub trait RefStore: Send + Sync + Debug {
    /// All refs whose name starts with `prefix`, by name.
    fn list_refs(&self, prefix: &str) -> GotResult<BTreeMap<String, ObjectHash>>;

    /// The hash a ref points at.
    fn resolve_ref(&self, name: &str) -> GotResult<ObjectHash>;

    /// Points a ref at a new hash, creating it if needed.
    fn update_ref(&self, name: &str, new: &ObjectHash) -> GotResult<()>;
}

fn validate_ref_name(name: &str) -> GotResult<()> {
    let well_formed = !name.is_empty()
        && !name.starts_with('/')
        && !name.ends_with('/')
        && name
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
        && !name.contains(['\0', '\n']);
    if well_formed {
        Ok(())
    } else {
        Err(GotError::InvalidInput(format!("bad ref name {name:?}")))
    }
}

/// Ref store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRefStore {
    refs: Mutex<BTreeMap<String, ObjectHash>>,
}

impl MemoryRefStore {
    /// An empty ref store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefStore for MemoryRefStore {
    fn list_refs(&self, prefix: &str) -> GotResult<BTreeMap<String, ObjectHash>> {
        Ok(self
            .refs
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, hash)| (name.clone(), *hash))
            .collect())
    }

    fn resolve_ref(&self, name: &str) -> GotResult<ObjectHash> {
        self.refs
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .ok_or_else(|| GotError::RefNotFound {
                name: name.to_owned(),
            })
    }

    fn update_ref(&self, name: &str, new: &ObjectHash) -> GotResult<()> {
        validate_ref_name(name)?;
        self.refs.lock().unwrap().insert(name.to_owned(), *new);
        Ok(())
    }
}

/// Loose refs: one file per ref under `refs/`, plus a `HEAD` file that is
/// either `ref: <name>` or a bare hash.
#[derive(Debug)]
pub struct FileRefStore {
    refs_dir: PathBuf,
    head_path: PathBuf,
}

impl FileRefStore {
    /// Opens the ref store inside a repository metadata directory.
    pub fn load(got_dir: &Path) -> Self {
        Self {
            refs_dir: got_dir.join("refs"),
            head_path: got_dir.join("HEAD"),
        }
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        name.split('/').fold(self.refs_dir.clone(), |p, part| p.join(part))
    }

    fn collect_refs(
        &self,
        dir: &Path,
        name_prefix: &str,
        out: &mut BTreeMap<String, ObjectHash>,
    ) -> GotResult<()> {
        for entry in fs::read_dir(dir).context(dir)? {
            let entry = entry.context(dir)?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let name = if name_prefix.is_empty() {
                file_name
            } else {
                format!("{name_prefix}/{file_name}")
            };
            let path = entry.path();
            if path.is_dir() {
                self.collect_refs(&path, &name, out)?;
            } else {
                let text = fs::read_to_string(&path).context(&path)?;
                out.insert(name, ObjectHash::parse(text.trim())?);
            }
        }
        Ok(())
    }

    /// What `HEAD` resolves to, following one level of `ref:` indirection.
    pub fn resolve_head(&self) -> GotResult<ObjectHash> {
        let text = match fs::read_to_string(&self.head_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GotError::RefNotFound {
                    name: "HEAD".to_owned(),
                });
            }
            Err(e) => {
                return Err(GotError::Io {
                    path: self.head_path.clone(),
                    source: e,
                });
            }
        };
        let text = text.trim();
        match text.strip_prefix("ref: ") {
            Some(name) => self.resolve_ref(name.trim()),
            None => ObjectHash::parse(text),
        }
    }

    /// Points `HEAD` at a ref by name.
    pub fn set_head_ref(&self, name: &str) -> GotResult<()> {
        validate_ref_name(name)?;
        fs::write(&self.head_path, format!("ref: {name}\n")).context(&self.head_path)
    }
}

impl RefStore for FileRefStore {
    fn list_refs(&self, prefix: &str) -> GotResult<BTreeMap<String, ObjectHash>> {
        let mut refs = BTreeMap::new();
        if self.refs_dir.exists() {
            let refs_dir = self.refs_dir.clone();
            self.collect_refs(&refs_dir, "", &mut refs)?;
        }
        refs.retain(|name, _| name.starts_with(prefix));
        Ok(refs)
    }

    fn resolve_ref(&self, name: &str) -> GotResult<ObjectHash> {
        validate_ref_name(name)?;
        let path = self.ref_path(name);
        match fs::read_to_string(&path) {
            Ok(text) => ObjectHash::parse(text.trim()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(GotError::RefNotFound {
                name: name.to_owned(),
            }),
            Err(e) => Err(GotError::Io { path, source: e }),
        }
    }

    fn update_ref(&self, name: &str, new: &ObjectHash) -> GotResult<()> {
        validate_ref_name(name)?;
        let path = self.ref_path(name);
        let parent = path.parent().unwrap_or(&self.refs_dir).to_path_buf();
        fs::create_dir_all(&parent).context(&parent)?;
        let temp_file = NamedTempFile::new_in(&parent).context(&parent)?;
        temp_file
            .as_file()
            .write_all(format!("{new}\n").as_bytes())
            .context(temp_file.path())?;
        persist_content_addressed_temp_file(temp_file, &path).context(&path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::hash::hash_bytes;

    #[test]
    fn test_memory_ref_store() {
        let store = MemoryRefStore::new();
        store.update_ref("heads/main", &hash_bytes(b"a")).unwrap();
        store.update_ref("heads/dev", &hash_bytes(b"b")).unwrap();
        store.update_ref("tags/v1", &hash_bytes(b"c")).unwrap();

        assert_eq!(store.resolve_ref("heads/main").unwrap(), hash_bytes(b"a"));
        assert_eq!(store.list_refs("heads/").unwrap().len(), 2);
        assert_matches!(
            store.resolve_ref("heads/gone"),
            Err(GotError::RefNotFound { .. })
        );
    }

    #[test]
    fn test_file_ref_store_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileRefStore::load(temp_dir.path());
        store.update_ref("heads/main", &hash_bytes(b"tip")).unwrap();
        assert_eq!(store.resolve_ref("heads/main").unwrap(), hash_bytes(b"tip"));

        // Update wins over the previous value.
        store.update_ref("heads/main", &hash_bytes(b"tip2")).unwrap();
        assert_eq!(store.resolve_ref("heads/main").unwrap(), hash_bytes(b"tip2"));

        let refs = store.list_refs("").unwrap();
        assert_eq!(refs.len(), 1);
        assert!(refs.contains_key("heads/main"));
    }

    #[test]
    fn test_head_indirection() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileRefStore::load(temp_dir.path());
        store.update_ref("heads/main", &hash_bytes(b"tip")).unwrap();
        store.set_head_ref("heads/main").unwrap();
        assert_eq!(store.resolve_head().unwrap(), hash_bytes(b"tip"));
    }

    #[test]
    fn test_rejects_escaping_ref_names() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileRefStore::load(temp_dir.path());
        for name in ["", "/abs", "a//b", "../escape", "a/../b", "trailing/"] {
            assert_matches!(
                store.update_ref(name, &hash_bytes(b"x")),
                Err(GotError::InvalidInput(_)),
                "name {name:?} should be rejected"
            );
        }
    }
}
