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

#![expect(missing_docs)]

//! The content-addressed object store.
//!
//! Objects live loose at `objects/<hh>/<rest>` or packed under
//! `objects/pack/`. Reads try the loose file first and fall through to the
//! pack indexes; writes are idempotent and land via temp file plus atomic
//! rename, so a crashed writer never leaves a partial object. An index file
//! whose pack is missing is treated as absent.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use crate::codec;
use crate::error::GotError;
use crate::error::GotResult;
use crate::file_util::IoResultExt as _;
use crate::file_util::create_or_reuse_dir;
use crate::file_util::persist_content_addressed_temp_file;
use crate::hash::envelope;
use crate::hash::hash_object;
use crate::object::Commit;
use crate::object::Entity;
use crate::object::EntityList;
use crate::object::ObjectType;
use crate::object::Tag;
use crate::object::Tree;
use crate::object_id::ObjectHash;
use crate::pack::PackEntry;
use crate::pack::PackIndex;
use crate::pack::read_pack;
use crate::pack::resolve_entries;

const PACK_DIR: &str = "pack";

/// Extends a codec error's context with the file it came from.
pub(crate) fn add_file_context(err: GotError, path: &Path) -> GotError {
    match err {
        GotError::Format { what, reason } => GotError::Format {
            what: format!("{what} in {}", path.display()),
            reason,
        },
        GotError::Corrupt { what, reason } => GotError::Corrupt {
            what: format!("{what} in {}", path.display()),
            reason,
        },
        other => other,
    }
}

/// Extends a codec error's context with the object it came from.
fn add_object_context(err: GotError, hash: &ObjectHash) -> GotError {
    match err {
        GotError::Format { what, reason } => GotError::Format {
            what: format!("{what} {hash}"),
            reason,
        },
        other => other,
    }
}

#[derive(Debug)]
struct ResolvedPack {
    entries: Vec<PackEntry>,
    by_offset: HashMap<u64, usize>,
}

/// Store rooted at an `objects` directory.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    indexes: Mutex<HashMap<PathBuf, Arc<PackIndex>>>,
    packs: Mutex<HashMap<PathBuf, Arc<ResolvedPack>>>,
}

impl Store {
    /// Creates the `objects` and `objects/pack` directories and returns the
    /// store.
    pub fn init(path: &Path) -> GotResult<Self> {
        create_or_reuse_dir(path).context(path)?;
        let pack_dir = path.join(PACK_DIR);
        create_or_reuse_dir(&pack_dir).context(&pack_dir)?;
        Ok(Self::load(path))
    }

    /// Opens an existing store without touching the filesystem.
    pub fn load(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            indexes: Mutex::new(HashMap::new()),
            packs: Mutex::new(HashMap::new()),
        }
    }

    /// The `objects` directory this store is rooted at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The pack directory.
    pub fn pack_dir(&self) -> PathBuf {
        self.path.join(PACK_DIR)
    }

    fn loose_path(&self, hash: &ObjectHash) -> PathBuf {
        let hex = hash.hex();
        self.path.join(&hex[..2]).join(&hex[2..])
    }

    /// Writes an object and returns its hash. Writing an object that is
    /// already present, loose or packed, is a no-op.
    pub fn write(&self, object_type: ObjectType, content: &[u8]) -> GotResult<ObjectHash> {
        let hash = hash_object(object_type, content);
        if self.has(&hash)? {
            return Ok(hash);
        }
        let hex = hash.hex();
        let dir = self.path.join(&hex[..2]);
        create_or_reuse_dir(&dir).context(&dir)?;
        let temp_file = NamedTempFile::new_in(&dir).context(&dir)?;
        temp_file
            .as_file()
            .write_all(&envelope(object_type, content))
            .context(temp_file.path())?;
        let target = self.loose_path(&hash);
        persist_content_addressed_temp_file(temp_file, &target).context(&target)?;
        Ok(hash)
    }

    /// Reads an object's type and content, from the loose file or a pack.
    pub fn read(&self, hash: &ObjectHash) -> GotResult<(ObjectType, Vec<u8>)> {
        let path = self.loose_path(hash);
        match fs::read(&path) {
            Ok(bytes) => {
                let (object_type, content) = codec::split_envelope(&bytes)
                    .map_err(|e| GotError::corrupt(path.display().to_string(), e.to_string()))?;
                Ok((object_type, content.to_vec()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.read_packed(hash),
            Err(e) => Err(GotError::Io { path, source: e }),
        }
    }

    /// Whether the object is present, loose or packed.
    pub fn has(&self, hash: &ObjectHash) -> GotResult<bool> {
        if self.loose_path(hash).exists() {
            return Ok(true);
        }
        for idx_path in self.pack_index_paths()? {
            let index = self.load_index(&idx_path)?;
            if index.contains(hash) && Self::pack_path_for(&idx_path).exists() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn read_packed(&self, hash: &ObjectHash) -> GotResult<(ObjectType, Vec<u8>)> {
        for idx_path in self.pack_index_paths()? {
            let index = self.load_index(&idx_path)?;
            let Some(entry) = index.find(hash) else {
                continue;
            };
            let pack_path = Self::pack_path_for(&idx_path);
            if !pack_path.exists() {
                // An index whose pack is gone does not count as presence.
                continue;
            }
            let offset = entry.offset;
            let pack = self.load_resolved_pack(&idx_path)?;
            let Some(&i) = pack.by_offset.get(&offset) else {
                return Err(GotError::corrupt(
                    pack_path.display().to_string(),
                    format!("index names offset {offset} but the pack has no entry there"),
                ));
            };
            let entry = &pack.entries[i];
            if entry.hash == Some(*hash) {
                return Ok((entry.object_type.unwrap(), entry.data.clone()));
            }
            // Envelope-wrapped entries carry their own type tag; prefer it
            // when the envelope hash matches the indexed hash.
            if let Ok((object_type, inner)) = codec::split_envelope(&entry.data)
                && hash_object(object_type, inner) == *hash
            {
                return Ok((object_type, inner.to_vec()));
            }
            return Err(GotError::corrupt(
                pack_path.display().to_string(),
                format!("entry at offset {offset} does not hash to {hash}"),
            ));
        }
        Err(GotError::NotFound { hash: hash.hex() })
    }

    fn typed_read(&self, hash: &ObjectHash, expected: ObjectType) -> GotResult<Vec<u8>> {
        let (actual, content) = self.read(hash)?;
        if actual != expected {
            return Err(GotError::TypeMismatch {
                hash: hash.hex(),
                expected,
                actual,
            });
        }
        Ok(content)
    }

    pub fn read_blob(&self, hash: &ObjectHash) -> GotResult<Vec<u8>> {
        self.typed_read(hash, ObjectType::Blob)
    }

    pub fn read_commit(&self, hash: &ObjectHash) -> GotResult<Commit> {
        let content = self.typed_read(hash, ObjectType::Commit)?;
        codec::decode_commit(&content).map_err(|e| add_object_context(e, hash))
    }

    pub fn read_tree(&self, hash: &ObjectHash) -> GotResult<Tree> {
        let content = self.typed_read(hash, ObjectType::Tree)?;
        codec::decode_tree(&content).map_err(|e| add_object_context(e, hash))
    }

    pub fn read_tag(&self, hash: &ObjectHash) -> GotResult<Tag> {
        let content = self.typed_read(hash, ObjectType::Tag)?;
        codec::decode_tag(&content).map_err(|e| add_object_context(e, hash))
    }

    pub fn read_entity(&self, hash: &ObjectHash) -> GotResult<Entity> {
        let content = self.typed_read(hash, ObjectType::Entity)?;
        codec::decode_entity(&content).map_err(|e| add_object_context(e, hash))
    }

    pub fn read_entity_list(&self, hash: &ObjectHash) -> GotResult<EntityList> {
        let content = self.typed_read(hash, ObjectType::EntityList)?;
        codec::decode_entity_list(&content).map_err(|e| add_object_context(e, hash))
    }

    /// Hashes of all loose objects. Files that don't spell a hash (stray
    /// temp files) are ignored.
    pub fn loose_hashes(&self) -> GotResult<Vec<ObjectHash>> {
        let mut hashes = Vec::new();
        for entry in fs::read_dir(&self.path).context(&self.path)? {
            let entry = entry.context(&self.path)?;
            let dir_name = entry.file_name();
            let Some(prefix) = dir_name.to_str() else {
                continue;
            };
            if prefix.len() != 2 || !entry.path().is_dir() {
                continue;
            }
            for file in fs::read_dir(entry.path()).context(entry.path())? {
                let file = file.context(entry.path())?;
                let Some(rest) = file.file_name().to_str().map(str::to_owned) else {
                    continue;
                };
                if let Some(hash) = ObjectHash::try_from_hex(format!("{prefix}{rest}")) {
                    hashes.push(hash);
                }
            }
        }
        Ok(hashes)
    }

    /// Deletes the loose file for `hash` if it exists. Returns whether a
    /// file was removed.
    pub fn remove_loose(&self, hash: &ObjectHash) -> GotResult<bool> {
        let path = self.loose_path(hash);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(GotError::Io { path, source: e }),
        }
    }

    /// Paths of all index files in the pack directory, sorted for
    /// deterministic lookup order.
    pub fn pack_index_paths(&self) -> GotResult<Vec<PathBuf>> {
        let pack_dir = self.pack_dir();
        if !pack_dir.exists() {
            return Ok(vec![]);
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(&pack_dir).context(&pack_dir)? {
            let entry = entry.context(&pack_dir)?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "idx") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// The pack file paired with an index file.
    pub fn pack_path_for(idx_path: &Path) -> PathBuf {
        idx_path.with_extension("pack")
    }

    /// The union of hashes named by every pack index whose pack exists.
    pub fn packed_hashes(&self) -> GotResult<std::collections::HashSet<ObjectHash>> {
        let mut hashes = std::collections::HashSet::new();
        for idx_path in self.pack_index_paths()? {
            if !Self::pack_path_for(&idx_path).exists() {
                continue;
            }
            let index = self.load_index(&idx_path)?;
            hashes.extend(index.entries().iter().map(|entry| entry.hash));
        }
        Ok(hashes)
    }

    fn load_index(&self, idx_path: &Path) -> GotResult<Arc<PackIndex>> {
        if let Some(index) = self.indexes.lock().unwrap().get(idx_path) {
            return Ok(index.clone());
        }
        let bytes = fs::read(idx_path).context(idx_path)?;
        let index = Arc::new(
            PackIndex::from_bytes(&bytes).map_err(|e| add_file_context(e, idx_path))?,
        );
        self.indexes
            .lock()
            .unwrap()
            .insert(idx_path.to_path_buf(), index.clone());
        Ok(index)
    }

    fn load_resolved_pack(&self, idx_path: &Path) -> GotResult<Arc<ResolvedPack>> {
        if let Some(pack) = self.packs.lock().unwrap().get(idx_path) {
            return Ok(pack.clone());
        }
        let pack_path = Self::pack_path_for(idx_path);
        let bytes = fs::read(&pack_path).context(&pack_path)?;
        let mut pack = read_pack(&bytes).map_err(|e| add_file_context(e, &pack_path))?;
        resolve_entries(&mut pack.entries).map_err(|e| add_file_context(e, &pack_path))?;
        let by_offset = pack
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.offset, i))
            .collect();
        let resolved = Arc::new(ResolvedPack {
            entries: pack.entries,
            by_offset,
        });
        self.packs
            .lock()
            .unwrap()
            .insert(idx_path.to_path_buf(), resolved.clone());
        Ok(resolved)
    }
}
