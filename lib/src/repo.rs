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

//! The on-disk repository: a working tree root with a `.got/` directory
//! holding the object store, refs, and `HEAD`.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use crate::error::GotError;
use crate::error::GotResult;
use crate::file_util::IoResultExt as _;
use crate::file_util::create_or_reuse_dir;
use crate::refs::FileRefStore;
use crate::store::Store;

/// Name of the repository metadata directory.
pub const GOT_DIR_NAME: &str = ".got";

/// The ref `HEAD` points at in a fresh repository.
pub const DEFAULT_BRANCH_REF: &str = "heads/main";

/// An opened repository.
#[derive(Debug)]
pub struct Repo {
    root: PathBuf,
    got_dir: PathBuf,
    store: Store,
    refs: FileRefStore,
}

impl Repo {
    /// Creates the `.got` layout under `root` and opens it. Reusing an
    /// existing layout is fine.
    pub fn init(root: &Path) -> GotResult<Self> {
        let got_dir = root.join(GOT_DIR_NAME);
        create_or_reuse_dir(&got_dir).context(&got_dir)?;
        let store = Store::init(&got_dir.join("objects"))?;
        let refs_dir = got_dir.join("refs");
        create_or_reuse_dir(&refs_dir).context(&refs_dir)?;
        let refs = FileRefStore::load(&got_dir);
        let head_path = got_dir.join("HEAD");
        if !head_path.exists() {
            fs::write(&head_path, format!("ref: {DEFAULT_BRANCH_REF}\n")).context(&head_path)?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            got_dir,
            store,
            refs,
        })
    }

    /// Opens the repository whose working tree root is `root`.
    pub fn load(root: &Path) -> GotResult<Self> {
        let got_dir = root.join(GOT_DIR_NAME);
        if !got_dir.is_dir() {
            return Err(GotError::InvalidInput(format!(
                "no {GOT_DIR_NAME} repository at {}",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
            store: Store::load(&got_dir.join("objects")),
            refs: FileRefStore::load(&got_dir),
            got_dir,
        })
    }

    /// Walks up from `start` to the closest directory containing `.got`.
    pub fn find(start: &Path) -> GotResult<Self> {
        for dir in start.ancestors() {
            if dir.join(GOT_DIR_NAME).is_dir() {
                return Self::load(dir);
            }
        }
        Err(GotError::InvalidInput(format!(
            "no {GOT_DIR_NAME} repository above {}",
            start.display()
        )))
    }

    /// The working tree root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `.got` metadata directory.
    pub fn got_dir(&self) -> &Path {
        &self.got_dir
    }

    /// The object store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The loose ref store.
    pub fn refs(&self) -> &FileRefStore {
        &self.refs
    }
}
