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

//! The optional entity trailer appended after a pack's checksum.
//!
//! Maps object hashes to the stable entity identifiers the extractor
//! assigned. Stable IDs are opaque to this crate; only byte round-trip and
//! `(hash, stable id)` ordering are guaranteed.

use sha2::Digest as _;
use sha2::Sha256;

use crate::error::GotError;
use crate::error::GotResult;
use crate::object_id::ObjectHash;

/// Leading magic of the trailer.
pub const ENTITY_TRAILER_MAGIC: &[u8; 4] = b"GENT";
/// The only supported trailer version.
pub const ENTITY_TRAILER_VERSION: u16 = 1;

const WHAT: &str = "entity trailer";

/// One `(object hash, stable id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntityTrailerEntry {
    /// Hash of the object the stable id belongs to.
    pub hash: ObjectHash,
    /// Opaque identifier, 1..=65535 bytes.
    pub stable_id: Vec<u8>,
}

/// Serializes a trailer. Entries are sorted by `(hash, stable id)`; IDs must
/// be 1..=65535 bytes.
pub fn encode_entity_trailer(entries: &[EntityTrailerEntry]) -> GotResult<Vec<u8>> {
    let mut sorted: Vec<&EntityTrailerEntry> = entries.iter().collect();
    sorted.sort();
    let mut buf = Vec::new();
    buf.extend_from_slice(ENTITY_TRAILER_MAGIC);
    buf.extend_from_slice(&ENTITY_TRAILER_VERSION.to_be_bytes());
    let count = u32::try_from(sorted.len())
        .map_err(|_| GotError::format(WHAT, "too many entries"))?;
    buf.extend_from_slice(&count.to_be_bytes());
    for entry in sorted {
        if entry.stable_id.is_empty() {
            return Err(GotError::format(WHAT, format!("empty stable id for {}", entry.hash)));
        }
        let len = u16::try_from(entry.stable_id.len()).map_err(|_| {
            GotError::format(
                WHAT,
                format!("stable id of {} bytes for {}", entry.stable_id.len(), entry.hash),
            )
        })?;
        buf.extend_from_slice(entry.hash.as_bytes());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&entry.stable_id);
    }
    let checksum: [u8; 32] = Sha256::digest(&buf).into();
    buf.extend_from_slice(&checksum);
    Ok(buf)
}

/// Parses a trailer. The input must be exactly one trailer: trailing bytes
/// past the declared entries are rejected.
pub fn decode_entity_trailer(data: &[u8]) -> GotResult<Vec<EntityTrailerEntry>> {
    if data.len() < 4 + 2 + 4 + 32 {
        return Err(GotError::format(WHAT, "truncated"));
    }
    if &data[..4] != ENTITY_TRAILER_MAGIC {
        return Err(GotError::format(WHAT, "bad magic"));
    }
    let computed: [u8; 32] = Sha256::digest(&data[..data.len() - 32]).into();
    if data[data.len() - 32..] != computed {
        return Err(GotError::corrupt(WHAT, "checksum mismatch"));
    }
    let version = u16::from_be_bytes(data[4..6].try_into().unwrap());
    if version != ENTITY_TRAILER_VERSION {
        return Err(GotError::format(WHAT, format!("unsupported version {version}")));
    }
    let count = u32::from_be_bytes(data[6..10].try_into().unwrap());

    let body_end = data.len() - 32;
    let mut pos = 10usize;
    let mut entries = Vec::with_capacity(count.min(1 << 20) as usize);
    for _ in 0..count {
        let raw = data
            .get(pos..pos + ObjectHash::LEN)
            .filter(|_| pos + ObjectHash::LEN <= body_end)
            .ok_or_else(|| GotError::format(WHAT, "truncated entry hash"))?;
        let hash = ObjectHash::from_bytes(raw)
            .ok_or_else(|| GotError::format(WHAT, "bad entry hash"))?;
        pos += ObjectHash::LEN;
        let len_bytes = data
            .get(pos..pos + 2)
            .filter(|_| pos + 2 <= body_end)
            .ok_or_else(|| GotError::format(WHAT, "truncated id length"))?;
        let len = usize::from(u16::from_be_bytes(len_bytes.try_into().unwrap()));
        pos += 2;
        if len == 0 {
            return Err(GotError::format(WHAT, "zero-length stable id"));
        }
        let id = data
            .get(pos..pos + len)
            .filter(|_| pos + len <= body_end)
            .ok_or_else(|| GotError::format(WHAT, "truncated stable id"))?;
        pos += len;
        entries.push(EntityTrailerEntry {
            hash,
            stable_id: id.to_vec(),
        });
    }
    if pos != body_end {
        return Err(GotError::format(WHAT, "trailing data after declared entries"));
    }
    Ok(entries)
}
