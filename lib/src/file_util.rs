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

use std::fs;
use std::fs::File;
use std::io;
use std::path::Path;

use tempfile::NamedTempFile;
use tempfile::PersistError;

use crate::error::GotError;
use crate::error::GotResult;

pub trait IoResultExt<T> {
    fn context(self, path: impl AsRef<Path>) -> GotResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn context(self, path: impl AsRef<Path>) -> GotResult<T> {
        self.map_err(|error| GotError::Io {
            path: path.as_ref().to_path_buf(),
            source: error,
        })
    }
}

/// Creates a directory or does nothing if the directory already exists.
///
/// The function will also fail if intermediate directories on the path do not
/// already exist.
pub fn create_or_reuse_dir(dirname: &Path) -> io::Result<()> {
    match fs::create_dir(dirname) {
        Ok(()) => Ok(()),
        Err(_) if dirname.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Persists a temp file at a content-addressed destination.
///
/// The destination is derived from the content, so an existing file at the
/// target path already holds the same bytes and losing the race is fine.
pub fn persist_content_addressed_temp_file<P: AsRef<Path>>(
    temp_file: NamedTempFile,
    new_path: P,
) -> io::Result<File> {
    // Ensure new file content is flushed to disk, so the old file content
    // wouldn't be lost if existed at the same location.
    temp_file.as_file().sync_data()?;
    if cfg!(windows) {
        // On Windows, overwriting file can fail if the file is opened without
        // FILE_SHARE_DELETE for example. We don't need to take a risk if the
        // file already exists.
        match temp_file.persist_noclobber(&new_path) {
            Ok(file) => Ok(file),
            Err(PersistError { error, file: _ }) => {
                if let Ok(existing_file) = File::open(new_path) {
                    Ok(existing_file)
                } else {
                    Err(error)
                }
            }
        }
    } else {
        // On Unix, rename() is atomic and should succeed even if the
        // destination file exists. Checking if the target exists might involve
        // non-atomic operation, so don't use persist_noclobber().
        temp_file
            .persist(new_path)
            .map_err(|PersistError { error, file: _ }| error)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn test_persist_over_existing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("file");
        fs::write(&target, b"contents").unwrap();

        let mut temp_file = NamedTempFile::new_in(&temp_dir).unwrap();
        temp_file.write_all(b"contents").unwrap();
        assert!(persist_content_addressed_temp_file(temp_file, &target).is_ok());
        assert_eq!(fs::read(&target).unwrap(), b"contents");
    }

    #[test]
    fn test_create_or_reuse_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("sub");
        create_or_reuse_dir(&dir).unwrap();
        create_or_reuse_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }
}
