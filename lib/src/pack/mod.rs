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

//! The pack file format: many objects in one file.
//!
//! A pack is `PACK` | version | entry count | entries | SHA-256 trailer,
//! optionally followed by an entity trailer. Each entry carries a 3-bit type
//! and a variable-length size in its header, then a zlib stream. Delta
//! entries encode their payload as a transformation of another entry.
//!
//! The 3-bit type space only covers commit, tree, blob, and tag; entities
//! and entity lists travel as blob entries holding their full envelope, and
//! readers recover the real type through the envelope-preference rule.

mod delta;
mod entity_trailer;
mod index;
mod reader;
mod writer;

use std::io::Write as _;

use flate2::Compression;
use flate2::write::ZlibEncoder;

pub use self::delta::apply_delta;
pub use self::delta::build_insert_only_delta;
pub use self::entity_trailer::EntityTrailerEntry;
pub use self::entity_trailer::decode_entity_trailer;
pub use self::entity_trailer::encode_entity_trailer;
pub use self::index::IndexEntry;
pub use self::index::PackIndex;
pub use self::index::encode_index;
pub use self::reader::Pack;
pub use self::reader::PackEntry;
pub use self::reader::read_pack;
pub use self::reader::resolve_entries;
pub use self::writer::PackWriter;
pub use self::writer::WrittenEntry;

use crate::error::GotError;
use crate::error::GotResult;
use crate::hash::envelope;
use crate::object::ObjectType;

/// Leading magic of every pack file.
pub const PACK_MAGIC: &[u8; 4] = b"PACK";
/// The only supported pack version.
pub const PACK_VERSION: u32 = 2;

/// On-disk entry type codes. 0 and 5 are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackEntryType {
    /// A commit, stored as raw content.
    Commit,
    /// A tree, stored as raw content.
    Tree,
    /// A blob, stored as raw content. Also the carrier for envelope-wrapped
    /// entity and entity-list objects.
    Blob,
    /// A tag, stored as raw content.
    Tag,
    /// A delta against the entry at a backward offset in the same pack.
    OfsDelta,
    /// A delta against the object with the given hash.
    RefDelta,
}

impl PackEntryType {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
            Self::OfsDelta => 6,
            Self::RefDelta => 7,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Commit),
            2 => Some(Self::Tree),
            3 => Some(Self::Blob),
            4 => Some(Self::Tag),
            6 => Some(Self::OfsDelta),
            7 => Some(Self::RefDelta),
            _ => None,
        }
    }

    /// Whether the payload is a delta stream rather than object content.
    pub fn is_delta(self) -> bool {
        matches!(self, Self::OfsDelta | Self::RefDelta)
    }

    /// The object type a non-delta entry stores.
    pub(crate) fn object_type(self) -> Option<ObjectType> {
        match self {
            Self::Commit => Some(ObjectType::Commit),
            Self::Tree => Some(ObjectType::Tree),
            Self::Blob => Some(ObjectType::Blob),
            Self::Tag => Some(ObjectType::Tag),
            Self::OfsDelta | Self::RefDelta => None,
        }
    }
}

/// Maps an object to the pack entry that stores it: native entries for the
/// four kinds with a type code, envelope-wrapped blob entries for the rest.
pub(crate) fn entry_payload(object_type: ObjectType, content: &[u8]) -> (PackEntryType, Vec<u8>) {
    match object_type {
        ObjectType::Commit => (PackEntryType::Commit, content.to_vec()),
        ObjectType::Tree => (PackEntryType::Tree, content.to_vec()),
        ObjectType::Blob => (PackEntryType::Blob, content.to_vec()),
        ObjectType::Tag => (PackEntryType::Tag, content.to_vec()),
        ObjectType::Entity | ObjectType::EntityList => {
            (PackEntryType::Blob, envelope(object_type, content))
        }
    }
}

/// Encodes an entry header: `0ttt ssss` with 7 more size bits per
/// continuation byte, little-endian by position.
pub(crate) fn encode_entry_header(entry_type: PackEntryType, size: u64) -> Vec<u8> {
    let mut out = Vec::new();
    let mut size = size;
    let mut byte = (entry_type.code() << 4) | (size & 0x0f) as u8;
    size >>= 4;
    while size > 0 {
        out.push(byte | 0x80);
        byte = (size & 0x7f) as u8;
        size >>= 7;
    }
    out.push(byte);
    out
}

/// Decodes an entry header at `pos`. Returns the type, the declared
/// uncompressed size, and the number of bytes consumed.
pub(crate) fn decode_entry_header(
    data: &[u8],
    pos: usize,
) -> GotResult<(PackEntryType, u64, usize)> {
    let mut i = pos;
    let mut byte = *data
        .get(i)
        .ok_or_else(|| GotError::format("pack entry header", "truncated"))?;
    i += 1;
    let code = (byte >> 4) & 0x07;
    let entry_type = PackEntryType::from_code(code)
        .ok_or_else(|| GotError::format("pack entry header", format!("invalid type code {code}")))?;
    let mut size = u64::from(byte & 0x0f);
    let mut shift = 4;
    while byte & 0x80 != 0 {
        byte = *data
            .get(i)
            .ok_or_else(|| GotError::format("pack entry header", "truncated size"))?;
        i += 1;
        if shift > 63 {
            return Err(GotError::format("pack entry header", "size varint too long"));
        }
        size |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }
    Ok((entry_type, size, i - pos))
}

/// Encodes the backward distance that precedes an OFS-delta payload.
///
/// Git's encoding: most significant 7-bit group first, continuation in the
/// high bit, and a +1 bias folded into every continuation step.
pub(crate) fn encode_ofs_distance(mut distance: u64) -> Vec<u8> {
    let mut bytes = vec![(distance & 0x7f) as u8];
    distance >>= 7;
    while distance > 0 {
        distance -= 1;
        bytes.push(((distance & 0x7f) as u8) | 0x80);
        distance >>= 7;
    }
    bytes.reverse();
    bytes
}

/// Decodes an OFS-delta distance at `pos`. Returns the distance and the
/// number of bytes consumed.
pub(crate) fn decode_ofs_distance(data: &[u8], pos: usize) -> GotResult<(u64, usize)> {
    let mut i = pos;
    let mut byte = *data
        .get(i)
        .ok_or_else(|| GotError::format("ofs-delta distance", "truncated"))?;
    i += 1;
    let mut distance = u64::from(byte & 0x7f);
    while byte & 0x80 != 0 {
        byte = *data
            .get(i)
            .ok_or_else(|| GotError::format("ofs-delta distance", "truncated"))?;
        i += 1;
        distance = distance
            .checked_add(1)
            .and_then(|d| d.checked_shl(7))
            .ok_or_else(|| GotError::format("ofs-delta distance", "distance overflow"))?
            | u64::from(byte & 0x7f);
    }
    Ok((distance, i - pos))
}

pub(crate) fn zlib_compress(data: &[u8]) -> GotResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(data.len() / 2 + 16),
        Compression::default(),
    );
    encoder
        .write_all(data)
        .and_then(|()| encoder.finish())
        .map_err(|e| GotError::format("zlib stream", e.to_string()))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(0)]
    #[test_case(15)]
    #[test_case(16)]
    #[test_case(127)]
    #[test_case(1 << 14)]
    #[test_case((1 << 32) + 17)]
    fn test_entry_header_round_trip(size: u64) {
        let bytes = encode_entry_header(PackEntryType::Tree, size);
        let (ty, decoded, consumed) = decode_entry_header(&bytes, 0).unwrap();
        assert_eq!(ty, PackEntryType::Tree);
        assert_eq!(decoded, size);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_entry_header_rejects_invalid_type_codes() {
        // Type 0 and 5 have no meaning.
        assert!(decode_entry_header(&[0x00], 0).is_err());
        assert!(decode_entry_header(&[0x50], 0).is_err());
    }

    #[test_case(1)]
    #[test_case(127)]
    #[test_case(128)]
    #[test_case(16383)]
    #[test_case(16384)]
    #[test_case(1 << 31)]
    fn test_ofs_distance_round_trip(distance: u64) {
        let bytes = encode_ofs_distance(distance);
        let (decoded, consumed) = decode_ofs_distance(&bytes, 0).unwrap();
        assert_eq!(decoded, distance);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_entity_payload_is_enveloped_blob() {
        let (ty, payload) = entry_payload(ObjectType::Entity, b"kind f\n\nbody");
        assert_eq!(ty, PackEntryType::Blob);
        assert!(payload.starts_with(b"entity 12\0"));

        let (ty, payload) = entry_payload(ObjectType::Blob, b"plain");
        assert_eq!(ty, PackEntryType::Blob);
        assert_eq!(payload, b"plain");
    }
}
