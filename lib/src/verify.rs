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

//! Integrity verification of everything the store holds.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fs;

use crate::codec::split_envelope;
use crate::error::GotError;
use crate::error::GotResult;
use crate::file_util::IoResultExt as _;
use crate::hash::hash_object;
use crate::object_id::ObjectHash;
use crate::pack::PackEntry;
use crate::pack::PackIndex;
use crate::pack::read_pack;
use crate::pack::resolve_entries;
use crate::store::Store;

/// What a verification walk covered.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerifyStats {
    pub loose_objects: usize,
    pub packs: usize,
    pub packed_entries: usize,
}

/// Whether a resolved pack entry stores the bytes `hash` names, directly or
/// through the envelope-wrapped form.
fn entry_matches(entry: &PackEntry, hash: &ObjectHash) -> bool {
    if entry.hash == Some(*hash) {
        return true;
    }
    if let Ok((object_type, inner)) = split_envelope(&entry.data) {
        return hash_object(object_type, inner) == *hash;
    }
    false
}

/// Re-hashes every loose object and cross-checks every pack against its
/// index. Fails fast on the first disagreement, naming the offending file
/// and hash.
#[tracing::instrument(skip(store))]
pub fn verify(store: &Store) -> GotResult<VerifyStats> {
    let mut stats = VerifyStats::default();

    for hash in store.loose_hashes()? {
        let hex = hash.hex();
        let path = store.path().join(&hex[..2]).join(&hex[2..]);
        let bytes = fs::read(&path).context(&path)?;
        let (object_type, content) = split_envelope(&bytes)
            .map_err(|e| GotError::corrupt(path.display().to_string(), e.to_string()))?;
        let computed = hash_object(object_type, content);
        if computed != hash {
            return Err(GotError::corrupt(
                path.display().to_string(),
                format!("content hashes to {computed}, filename says {hash}"),
            ));
        }
        stats.loose_objects += 1;
    }

    for idx_path in store.pack_index_paths()? {
        let idx_name = idx_path.display().to_string();
        let idx_bytes = fs::read(&idx_path).context(&idx_path)?;
        let index = PackIndex::from_bytes(&idx_bytes)
            .map_err(|e| crate::store::add_file_context(e, &idx_path))?;

        let pack_path = Store::pack_path_for(&idx_path);
        if !pack_path.exists() {
            return Err(GotError::corrupt(idx_name, "paired pack file is missing"));
        }
        let pack_name = pack_path.display().to_string();
        let pack_bytes = fs::read(&pack_path).context(&pack_path)?;
        let mut pack = read_pack(&pack_bytes)
            .map_err(|e| crate::store::add_file_context(e, &pack_path))?;
        resolve_entries(&mut pack.entries)
            .map_err(|e| crate::store::add_file_context(e, &pack_path))?;

        if index.pack_checksum() != &pack.checksum {
            return Err(GotError::corrupt(
                idx_name,
                format!(
                    "records pack checksum {}, pack trailer says {}",
                    index.pack_checksum(),
                    pack.checksum
                ),
            ));
        }
        if index.len() != pack.entries.len() {
            return Err(GotError::corrupt(
                idx_name,
                format!("names {} entries, pack holds {}", index.len(), pack.entries.len()),
            ));
        }

        let by_offset: HashMap<u64, &PackEntry> = pack
            .entries
            .iter()
            .map(|entry| (entry.offset, entry))
            .collect();
        let mut seen_offsets = HashSet::new();
        for index_entry in index.entries() {
            if !seen_offsets.insert(index_entry.offset) {
                return Err(GotError::corrupt(
                    idx_name,
                    format!("duplicate offset {}", index_entry.offset),
                ));
            }
            let Some(entry) = by_offset.get(&index_entry.offset) else {
                return Err(GotError::corrupt(
                    idx_name,
                    format!(
                        "offset {} for {} has no pack entry",
                        index_entry.offset, index_entry.hash
                    ),
                ));
            };
            if !entry_matches(entry, &index_entry.hash) {
                return Err(GotError::corrupt(
                    pack_name,
                    format!(
                        "entry at offset {} does not store {}",
                        index_entry.offset, index_entry.hash
                    ),
                ));
            }
            stats.packed_entries += 1;
        }
        stats.packs += 1;
    }

    tracing::debug!(
        loose = stats.loose_objects,
        packs = stats.packs,
        entries = stats.packed_entries,
        "verify finished"
    );
    Ok(stats)
}
