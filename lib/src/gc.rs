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

//! Garbage collection: rewrite loose objects into a pack.
//!
//! A pack and its index are staged as temp files and renamed into place,
//! pack first, then index, so a reader never sees an index pointing at a
//! missing pack. Running GC with nothing to do succeeds without writing.

use std::io::Write as _;
use std::path::PathBuf;

use tempfile::NamedTempFile;

use crate::error::GotResult;
use crate::file_util::IoResultExt as _;
use crate::file_util::persist_content_addressed_temp_file;
use crate::graph::reachable_set;
use crate::object_id::ObjectHash;
use crate::pack::IndexEntry;
use crate::pack::PackWriter;
use crate::pack::encode_index;
use crate::store::Store;

/// What a GC run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GcStats {
    /// Objects written into the new pack.
    pub packed: usize,
    /// Loose files removed.
    pub pruned: usize,
    /// Path of the new pack, when one was written.
    pub pack_path: Option<PathBuf>,
}

/// Packs every loose object that no existing pack already holds.
///
/// With `prune`, the loose copies of the packed objects are removed
/// afterwards. Running twice in a row packs nothing the second time.
#[tracing::instrument(skip(store))]
pub fn pack_loose_objects(store: &Store, prune: bool) -> GotResult<GcStats> {
    let packed = store.packed_hashes()?;
    let mut remaining: Vec<ObjectHash> = store
        .loose_hashes()?
        .into_iter()
        .filter(|hash| !packed.contains(hash))
        .collect();
    remaining.sort();
    remaining.dedup();
    if remaining.is_empty() {
        tracing::debug!("no loose objects to pack");
        return Ok(GcStats::default());
    }

    let pack_path = write_pack_with_index(store, &remaining)?;
    let mut stats = GcStats {
        packed: remaining.len(),
        pruned: 0,
        pack_path: Some(pack_path),
    };
    if prune {
        for hash in &remaining {
            if store.remove_loose(hash)? {
                stats.pruned += 1;
            }
        }
    }
    tracing::debug!(packed = stats.packed, pruned = stats.pruned, "gc finished");
    Ok(stats)
}

/// Packs the loose objects reachable from `roots`; with `prune`, removes
/// every loose file that is either unreachable or now packed.
#[tracing::instrument(skip(store, roots), fields(roots = roots.len()))]
pub fn pack_reachable(store: &Store, roots: &[ObjectHash], prune: bool) -> GotResult<GcStats> {
    let reachable = reachable_set(store, roots)?;
    let packed = store.packed_hashes()?;
    let loose = store.loose_hashes()?;

    let mut to_pack: Vec<ObjectHash> = loose
        .iter()
        .filter(|hash| reachable.contains(hash) && !packed.contains(hash))
        .copied()
        .collect();
    to_pack.sort();
    to_pack.dedup();

    let mut stats = GcStats::default();
    if !to_pack.is_empty() {
        stats.pack_path = Some(write_pack_with_index(store, &to_pack)?);
        stats.packed = to_pack.len();
    }

    if prune {
        for hash in &loose {
            let now_packed = packed.contains(hash) || to_pack.binary_search(hash).is_ok();
            if (!reachable.contains(hash) || now_packed) && store.remove_loose(hash)? {
                stats.pruned += 1;
            }
        }
    }
    tracing::debug!(packed = stats.packed, pruned = stats.pruned, "reachable gc finished");
    Ok(stats)
}

/// Writes a pack holding `hashes` plus its index, installing the pack
/// before the index.
fn write_pack_with_index(store: &Store, hashes: &[ObjectHash]) -> GotResult<PathBuf> {
    let mut writer = PackWriter::new(hashes.len() as u32);
    let mut index_entries = Vec::with_capacity(hashes.len());
    for hash in hashes {
        let (object_type, content) = store.read(hash)?;
        let written = writer.write_object(object_type, &content)?;
        index_entries.push(IndexEntry {
            hash: *hash,
            crc32: written.crc32,
            offset: written.offset,
        });
    }
    let (pack_bytes, checksum) = writer.finish()?;
    let (index_bytes, _) = encode_index(&index_entries, &checksum)?;

    let pack_dir = store.pack_dir();
    let pack_path = pack_dir.join(format!("pack-{}.pack", checksum.hex()));
    let idx_path = pack_dir.join(format!("pack-{}.idx", checksum.hex()));

    let temp_file = NamedTempFile::new_in(&pack_dir).context(&pack_dir)?;
    temp_file
        .as_file()
        .write_all(&pack_bytes)
        .context(temp_file.path())?;
    persist_content_addressed_temp_file(temp_file, &pack_path).context(&pack_path)?;

    let temp_file = NamedTempFile::new_in(&pack_dir).context(&pack_dir)?;
    temp_file
        .as_file()
        .write_all(&index_bytes)
        .context(temp_file.path())?;
    persist_content_addressed_temp_file(temp_file, &idx_path).context(&idx_path)?;

    Ok(pack_path)
}
