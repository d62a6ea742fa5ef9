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

//! Pack decoding and delta resolution.

use std::collections::HashMap;
use std::io::Read as _;

use flate2::read::ZlibDecoder;
use sha2::Digest as _;
use sha2::Sha256;

use crate::error::GotError;
use crate::error::GotResult;
use crate::hash::hash_object;
use crate::object::ObjectType;
use crate::object_id::ObjectHash;
use crate::pack::EntityTrailerEntry;
use crate::pack::PACK_MAGIC;
use crate::pack::PACK_VERSION;
use crate::pack::PackEntryType;
use crate::pack::decode_entity_trailer;
use crate::pack::decode_entry_header;
use crate::pack::decode_ofs_distance;

/// One decoded pack entry.
///
/// Right after [`read_pack`], `data` holds the decompressed payload: object
/// content for non-delta entries, the delta stream for delta entries. After
/// [`resolve_entries`], `data` holds concrete object content for every entry
/// and `object_type`/`hash` are filled in; `entry_type` keeps the on-disk
/// type so callers can still tell deltas apart.
#[derive(Debug, Clone)]
pub struct PackEntry {
    pub offset: u64,
    pub entry_type: PackEntryType,
    pub data: Vec<u8>,
    /// Absolute offset of the base entry, for OFS deltas.
    pub base_offset: Option<u64>,
    /// Hash of the base object, for REF deltas.
    pub base_hash: Option<ObjectHash>,
    /// Stored object type; `None` until deltas are resolved.
    pub object_type: Option<ObjectType>,
    /// Hash of the stored content; `None` until deltas are resolved.
    pub hash: Option<ObjectHash>,
}

impl PackEntry {
    /// Whether this entry was stored as a delta.
    pub fn is_delta(&self) -> bool {
        self.entry_type.is_delta()
    }
}

/// A fully parsed pack file.
#[derive(Debug)]
pub struct Pack {
    pub entries: Vec<PackEntry>,
    /// The SHA-256 trailer the pack carries over its own bytes.
    pub checksum: ObjectHash,
    /// Entries of the entity trailer, when one is present.
    pub entity_entries: Option<Vec<EntityTrailerEntry>>,
}

/// Parses a pack file. Entry payloads are decompressed and validated
/// against their declared sizes; deltas are left unresolved.
pub fn read_pack(data: &[u8]) -> GotResult<Pack> {
    const WHAT: &str = "pack";
    if data.len() < 12 {
        return Err(GotError::format(WHAT, "truncated header"));
    }
    if &data[..4] != PACK_MAGIC {
        return Err(GotError::format(WHAT, "bad magic"));
    }
    let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
    if version != PACK_VERSION {
        return Err(GotError::format(WHAT, format!("unsupported version {version}")));
    }
    let count = u32::from_be_bytes(data[8..12].try_into().unwrap());

    let mut entries = Vec::with_capacity(count as usize);
    let mut pos = 12usize;
    for index in 0..count {
        let offset = pos as u64;
        let (entry_type, size, consumed) = decode_entry_header(data, pos)?;
        pos += consumed;

        let mut base_offset = None;
        let mut base_hash = None;
        match entry_type {
            PackEntryType::OfsDelta => {
                let (distance, consumed) = decode_ofs_distance(data, pos)?;
                pos += consumed;
                let base = offset.checked_sub(distance).ok_or_else(|| {
                    GotError::format(
                        WHAT,
                        format!("entry {index}: ofs-delta distance {distance} before pack start"),
                    )
                })?;
                base_offset = Some(base);
            }
            PackEntryType::RefDelta => {
                let raw = data.get(pos..pos + ObjectHash::LEN).ok_or_else(|| {
                    GotError::format(WHAT, format!("entry {index}: truncated base hash"))
                })?;
                base_hash = ObjectHash::from_bytes(raw);
                pos += ObjectHash::LEN;
            }
            _ => {}
        }

        // Let zlib consume exactly as many bytes as its stream needs, then
        // advance the cursor by that amount.
        let mut decoder = ZlibDecoder::new(&data[pos..]);
        let mut payload = Vec::with_capacity(size.min(1 << 24) as usize);
        decoder.read_to_end(&mut payload).map_err(|e| {
            GotError::format(WHAT, format!("entry {index}: zlib decode failed: {e}"))
        })?;
        pos += decoder.total_in() as usize;
        if payload.len() as u64 != size {
            return Err(GotError::corrupt(
                WHAT,
                format!(
                    "entry {index}: payload is {} bytes, header says {size}",
                    payload.len()
                ),
            ));
        }

        entries.push(PackEntry {
            offset,
            entry_type,
            data: payload,
            base_offset,
            base_hash,
            object_type: entry_type.object_type(),
            hash: None,
        });
    }

    let trailer = data
        .get(pos..pos + ObjectHash::LEN)
        .ok_or_else(|| GotError::format(WHAT, "truncated checksum trailer"))?;
    let computed: [u8; 32] = Sha256::digest(&data[..pos]).into();
    if trailer != computed {
        return Err(GotError::corrupt(WHAT, "checksum trailer mismatch"));
    }
    let checksum = ObjectHash::from_digest(computed);
    pos += ObjectHash::LEN;

    // Anything after the checksum must be a well-formed entity trailer.
    let entity_entries = if pos == data.len() {
        None
    } else {
        Some(decode_entity_trailer(&data[pos..])?)
    };

    // Hashes for non-delta entries are known immediately.
    for entry in &mut entries {
        if let Some(object_type) = entry.object_type {
            entry.hash = Some(hash_object(object_type, &entry.data));
        }
    }

    Ok(Pack {
        entries,
        checksum,
        entity_entries,
    })
}

/// Resolves every delta entry to concrete content by fixed-point iteration:
/// each pass applies deltas whose base is already concrete; a pass that
/// makes no progress means an unresolvable delta and fails.
pub fn resolve_entries(entries: &mut [PackEntry]) -> GotResult<()> {
    let mut by_offset: HashMap<u64, usize> = HashMap::new();
    let mut by_hash: HashMap<ObjectHash, usize> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        if let Some(hash) = entry.hash {
            by_offset.insert(entry.offset, i);
            by_hash.insert(hash, i);
        }
    }

    loop {
        let mut progressed = false;
        let mut unresolved = false;
        for i in 0..entries.len() {
            if entries[i].hash.is_some() {
                continue;
            }
            let base_index = match (entries[i].base_offset, entries[i].base_hash) {
                (Some(offset), _) => by_offset.get(&offset).copied(),
                (None, Some(hash)) => by_hash.get(&hash).copied(),
                (None, None) => None,
            };
            let Some(base_index) = base_index else {
                unresolved = true;
                continue;
            };
            let (base_type, base_data) = {
                let base = &entries[base_index];
                (base.object_type.unwrap(), base.data.clone())
            };
            let resolved = crate::pack::apply_delta(&base_data, &entries[i].data)?;
            let hash = hash_object(base_type, &resolved);
            let entry = &mut entries[i];
            entry.data = resolved;
            entry.object_type = Some(base_type);
            entry.hash = Some(hash);
            by_offset.insert(entry.offset, i);
            by_hash.insert(hash, i);
            progressed = true;
        }
        if !unresolved {
            return Ok(());
        }
        if !progressed {
            return Err(GotError::format("pack", "unresolved delta entries"));
        }
    }
}
