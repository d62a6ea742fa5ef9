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

//! The pack index (idx v2): hash to pack offset lookup.
//!
//! Layout: magic `\xFF t O c` | version | 256 cumulative fanout counts |
//! sorted 32-byte hashes | CRC32 per entry | 4-byte offsets (top bit set
//! means an index into the large-offset table) | 8-byte large offsets |
//! pack checksum | index checksum.

use sha2::Digest as _;
use sha2::Sha256;

use crate::error::GotError;
use crate::error::GotResult;
use crate::object_id::ObjectHash;

/// Leading magic of every index file.
pub const INDEX_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];
/// The only supported index version.
pub const INDEX_VERSION: u32 = 2;

/// Offsets at or above this bit go through the large-offset table.
const LARGE_OFFSET_THRESHOLD: u64 = 1 << 31;
const LARGE_OFFSET_FLAG: u32 = 1 << 31;

const WHAT: &str = "pack index";

/// One index row: a hash, the CRC32 of its packed bytes, and its offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub hash: ObjectHash,
    pub crc32: u32,
    pub offset: u64,
}

/// Serializes an index for the given entries and pack checksum. Entries are
/// sorted by hash; the index checksum over the whole body is appended last
/// and also returned.
pub fn encode_index(
    entries: &[IndexEntry],
    pack_checksum: &ObjectHash,
) -> GotResult<(Vec<u8>, ObjectHash)> {
    let mut sorted: Vec<&IndexEntry> = entries.iter().collect();
    sorted.sort_by_key(|entry| entry.hash);
    for pair in sorted.windows(2) {
        if pair[0].hash == pair[1].hash {
            return Err(GotError::format(
                WHAT,
                format!("duplicate hash {}", pair[0].hash),
            ));
        }
    }

    let mut fanout = [0u32; 256];
    for entry in &sorted {
        fanout[usize::from(entry.hash.first_byte())] += 1;
    }
    for i in 1..256 {
        fanout[i] += fanout[i - 1];
    }

    let mut buf = Vec::new();
    buf.extend_from_slice(&INDEX_MAGIC);
    buf.extend_from_slice(&INDEX_VERSION.to_be_bytes());
    for count in fanout {
        buf.extend_from_slice(&count.to_be_bytes());
    }
    for entry in &sorted {
        buf.extend_from_slice(entry.hash.as_bytes());
    }
    for entry in &sorted {
        buf.extend_from_slice(&entry.crc32.to_be_bytes());
    }
    let mut large_offsets: Vec<u64> = Vec::new();
    for entry in &sorted {
        if entry.offset < LARGE_OFFSET_THRESHOLD {
            buf.extend_from_slice(&(entry.offset as u32).to_be_bytes());
        } else {
            let index = large_offsets.len() as u32;
            large_offsets.push(entry.offset);
            buf.extend_from_slice(&(LARGE_OFFSET_FLAG | index).to_be_bytes());
        }
    }
    for offset in large_offsets {
        buf.extend_from_slice(&offset.to_be_bytes());
    }
    buf.extend_from_slice(pack_checksum.as_bytes());
    let index_checksum = ObjectHash::from_digest(Sha256::digest(&buf).into());
    buf.extend_from_slice(index_checksum.as_bytes());
    Ok((buf, index_checksum))
}

/// A validated, loaded pack index.
#[derive(Debug)]
pub struct PackIndex {
    entries: Vec<IndexEntry>,
    fanout: [u32; 256],
    pack_checksum: ObjectHash,
}

impl PackIndex {
    /// Parses and fully validates an index: magic, version, fanout
    /// consistency, hash ordering, large-offset references, and both
    /// checksums.
    pub fn from_bytes(data: &[u8]) -> GotResult<Self> {
        const HEADER: usize = 4 + 4 + 256 * 4;
        // Header, both checksums.
        if data.len() < HEADER + 64 {
            return Err(GotError::format(WHAT, "truncated"));
        }
        if data[..4] != INDEX_MAGIC {
            return Err(GotError::format(WHAT, "bad magic"));
        }
        let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
        if version != INDEX_VERSION {
            return Err(GotError::format(WHAT, format!("unsupported version {version}")));
        }

        let computed: [u8; 32] = Sha256::digest(&data[..data.len() - 32]).into();
        if data[data.len() - 32..] != computed {
            return Err(GotError::corrupt(WHAT, "index checksum mismatch"));
        }
        let pack_checksum = ObjectHash::from_bytes(&data[data.len() - 64..data.len() - 32])
            .ok_or_else(|| GotError::format(WHAT, "bad pack checksum field"))?;

        let mut fanout = [0u32; 256];
        for (i, chunk) in data[8..HEADER].chunks_exact(4).enumerate() {
            fanout[i] = u32::from_be_bytes(chunk.try_into().unwrap());
            if i > 0 && fanout[i] < fanout[i - 1] {
                return Err(GotError::format(WHAT, "fanout not monotonic"));
            }
        }
        let count = fanout[255] as usize;

        let tables_len = data.len() - HEADER - 64;
        let fixed = count
            .checked_mul(40)
            .ok_or_else(|| GotError::format(WHAT, "entry count overflow"))?;
        let large_len = tables_len
            .checked_sub(fixed)
            .ok_or_else(|| GotError::format(WHAT, "tables shorter than fanout claims"))?;
        if large_len % 8 != 0 {
            return Err(GotError::format(WHAT, "misaligned large-offset table"));
        }
        let large_count = large_len / 8;

        let names_start = HEADER;
        let crcs_start = names_start + count * 32;
        let offsets_start = crcs_start + count * 4;
        let large_start = offsets_start + count * 4;

        let mut large_offsets = Vec::with_capacity(large_count);
        for chunk in data[large_start..large_start + large_len].chunks_exact(8) {
            large_offsets.push(u64::from_be_bytes(chunk.try_into().unwrap()));
        }

        let mut entries = Vec::with_capacity(count);
        let mut previous: Option<ObjectHash> = None;
        for i in 0..count {
            let hash = ObjectHash::from_bytes(&data[names_start + i * 32..names_start + (i + 1) * 32])
                .ok_or_else(|| GotError::format(WHAT, "bad name table entry"))?;
            if let Some(previous) = previous
                && previous >= hash
            {
                return Err(GotError::format(WHAT, "name table not sorted"));
            }
            previous = Some(hash);

            let crc32 =
                u32::from_be_bytes(data[crcs_start + i * 4..crcs_start + (i + 1) * 4].try_into().unwrap());
            let raw_offset = u32::from_be_bytes(
                data[offsets_start + i * 4..offsets_start + (i + 1) * 4].try_into().unwrap(),
            );
            let offset = if raw_offset & LARGE_OFFSET_FLAG != 0 {
                let index = (raw_offset & !LARGE_OFFSET_FLAG) as usize;
                *large_offsets.get(index).ok_or_else(|| {
                    GotError::format(WHAT, format!("large-offset reference {index} out of range"))
                })?
            } else {
                u64::from(raw_offset)
            };
            entries.push(IndexEntry { hash, crc32, offset });
        }

        // The per-bucket counts must agree with the name table.
        let mut recomputed = [0u32; 256];
        for entry in &entries {
            recomputed[usize::from(entry.hash.first_byte())] += 1;
        }
        for i in 1..256 {
            recomputed[i] += recomputed[i - 1];
        }
        if recomputed != fanout {
            return Err(GotError::format(WHAT, "fanout disagrees with name table"));
        }

        Ok(Self {
            entries,
            fanout,
            pack_checksum,
        })
    }

    /// Looks up a hash with a fanout-bounded binary search.
    pub fn find(&self, hash: &ObjectHash) -> Option<&IndexEntry> {
        let bucket = usize::from(hash.first_byte());
        let lo = if bucket == 0 {
            0
        } else {
            self.fanout[bucket - 1] as usize
        };
        let hi = self.fanout[bucket] as usize;
        let slice = &self.entries[lo..hi];
        let i = slice.binary_search_by_key(hash, |entry| entry.hash).ok()?;
        Some(&slice[i])
    }

    pub fn contains(&self, hash: &ObjectHash) -> bool {
        self.find(hash).is_some()
    }

    /// Entries in hash order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The checksum of the pack this index describes.
    pub fn pack_checksum(&self) -> &ObjectHash {
        &self.pack_checksum
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::error::GotError;
    use crate::hash::hash_bytes;

    fn sample_entries() -> Vec<IndexEntry> {
        (0..50u32)
            .map(|i| IndexEntry {
                hash: hash_bytes(&i.to_be_bytes()),
                crc32: i,
                offset: u64::from(i) * 100 + 12,
            })
            .collect()
    }

    fn sample_index() -> (Vec<u8>, Vec<IndexEntry>) {
        let entries = sample_entries();
        let (bytes, _) = encode_index(&entries, &hash_bytes(b"pack")).unwrap();
        (bytes, entries)
    }

    #[test]
    fn test_round_trip_and_find() {
        let (bytes, entries) = sample_index();
        let index = PackIndex::from_bytes(&bytes).unwrap();
        assert_eq!(index.len(), entries.len());
        assert_eq!(index.pack_checksum(), &hash_bytes(b"pack"));
        for entry in &entries {
            let found = index.find(&entry.hash).unwrap();
            assert_eq!(found.offset, entry.offset);
            assert_eq!(found.crc32, entry.crc32);
        }
        assert!(index.find(&hash_bytes(b"absent")).is_none());
    }

    #[test]
    fn test_fanout_last_bucket_is_count() {
        let (bytes, entries) = sample_index();
        let index = PackIndex::from_bytes(&bytes).unwrap();
        assert_eq!(index.fanout[255] as usize, entries.len());
    }

    #[test]
    fn test_large_offsets() {
        let small = IndexEntry {
            hash: hash_bytes(b"small"),
            crc32: 1,
            offset: 12,
        };
        let large = IndexEntry {
            hash: hash_bytes(b"large"),
            crc32: 2,
            offset: (1 << 31) + 9,
        };
        let (bytes, _) = encode_index(&[small, large], &hash_bytes(b"pack")).unwrap();
        let index = PackIndex::from_bytes(&bytes).unwrap();
        assert_eq!(index.find(&large.hash).unwrap().offset, (1 << 31) + 9);
        assert_eq!(index.find(&small.hash).unwrap().offset, 12);

        // Exactly one 8-byte large offset was emitted.
        let body = 4 + 4 + 1024 + 2 * 32 + 2 * 4 + 2 * 4;
        assert_eq!(bytes.len(), body + 8 + 64);
    }

    #[test]
    fn test_rejects_checksum_flip() {
        let (mut bytes, _) = sample_index();
        bytes[100] ^= 0x40;
        assert_matches!(PackIndex::from_bytes(&bytes), Err(GotError::Corrupt { .. }));
    }

    #[test]
    fn test_rejects_bad_magic_and_version() {
        let (bytes, _) = sample_index();
        let mut bad = bytes.clone();
        bad[0] = 0;
        assert_matches!(PackIndex::from_bytes(&bad), Err(GotError::Format { .. }));

        // A version flip also breaks the checksum; a format error for either
        // reason is acceptable, but it must not load.
        let mut bad = bytes;
        bad[7] = 9;
        assert!(PackIndex::from_bytes(&bad).is_err());
    }

    #[test]
    fn test_rejects_duplicate_hashes() {
        let entry = IndexEntry {
            hash: hash_bytes(b"dup"),
            crc32: 0,
            offset: 12,
        };
        assert_matches!(
            encode_index(&[entry, entry], &hash_bytes(b"pack")),
            Err(GotError::Format { .. })
        );
    }

    #[test]
    fn test_empty_index() {
        let (bytes, _) = encode_index(&[], &hash_bytes(b"pack")).unwrap();
        let index = PackIndex::from_bytes(&bytes).unwrap();
        assert!(index.is_empty());
        assert!(index.find(&hash_bytes(b"anything")).is_none());
    }
}
