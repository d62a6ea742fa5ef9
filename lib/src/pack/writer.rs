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

//! Pack construction.

use sha2::Digest as _;
use sha2::Sha256;

use crate::error::GotError;
use crate::error::GotResult;
use crate::object::ObjectType;
use crate::object_id::ObjectHash;
use crate::pack::PACK_MAGIC;
use crate::pack::PACK_VERSION;
use crate::pack::PackEntryType;
use crate::pack::encode_entry_header;
use crate::pack::encode_ofs_distance;
use crate::pack::entry_payload;
use crate::pack::zlib_compress;

/// Where an entry landed in the pack under construction. The offset and
/// CRC32 feed the index writer.
#[derive(Debug, Clone, Copy)]
pub struct WrittenEntry {
    /// Byte offset of the entry header from the start of the pack.
    pub offset: u64,
    /// CRC32 over the entry's on-disk bytes (header through zlib stream).
    pub crc32: u32,
}

/// Builds a pack in memory.
///
/// The writer is told how many entries to expect up front; it refuses extra
/// entries and refuses to finish short. `finish` appends the SHA-256 trailer
/// over everything written and hands back the bytes, so the caller decides
/// where they land (a temp file for GC, a request body for push).
#[derive(Debug)]
pub struct PackWriter {
    buf: Vec<u8>,
    expected_count: u32,
    written_count: u32,
}

impl PackWriter {
    /// Starts a pack that will hold exactly `expected_count` entries.
    pub fn new(expected_count: u32) -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(PACK_MAGIC);
        buf.extend_from_slice(&PACK_VERSION.to_be_bytes());
        buf.extend_from_slice(&expected_count.to_be_bytes());
        Self {
            buf,
            expected_count,
            written_count: 0,
        }
    }

    /// Current write position, the offset the next entry would get.
    pub fn offset(&self) -> u64 {
        self.buf.len() as u64
    }

    fn begin_entry(&mut self) -> GotResult<u64> {
        if self.written_count == self.expected_count {
            return Err(GotError::PreconditionFailed(format!(
                "pack already holds the expected {} entries",
                self.expected_count
            )));
        }
        Ok(self.buf.len() as u64)
    }

    fn end_entry(&mut self, start: u64) -> WrittenEntry {
        self.written_count += 1;
        let mut crc = crc32fast::Hasher::new();
        crc.update(&self.buf[start as usize..]);
        WrittenEntry {
            offset: start,
            crc32: crc.finalize(),
        }
    }

    /// Writes one object as a non-delta entry.
    pub fn write_object(
        &mut self,
        object_type: ObjectType,
        content: &[u8],
    ) -> GotResult<WrittenEntry> {
        let start = self.begin_entry()?;
        let (entry_type, payload) = entry_payload(object_type, content);
        self.buf
            .extend_from_slice(&encode_entry_header(entry_type, payload.len() as u64));
        let compressed = zlib_compress(&payload)?;
        self.buf.extend_from_slice(&compressed);
        Ok(self.end_entry(start))
    }

    /// Writes a delta against the entry at `base_offset`, which must be
    /// strictly before the current position.
    pub fn write_ofs_delta(&mut self, base_offset: u64, delta: &[u8]) -> GotResult<WrittenEntry> {
        let start = self.begin_entry()?;
        if base_offset >= start {
            return Err(GotError::PreconditionFailed(format!(
                "ofs-delta base offset {base_offset} is not before entry offset {start}"
            )));
        }
        self.buf
            .extend_from_slice(&encode_entry_header(PackEntryType::OfsDelta, delta.len() as u64));
        self.buf
            .extend_from_slice(&encode_ofs_distance(start - base_offset));
        let compressed = zlib_compress(delta)?;
        self.buf.extend_from_slice(&compressed);
        Ok(self.end_entry(start))
    }

    /// Writes a delta against the object identified by `base`.
    pub fn write_ref_delta(&mut self, base: &ObjectHash, delta: &[u8]) -> GotResult<WrittenEntry> {
        let start = self.begin_entry()?;
        self.buf
            .extend_from_slice(&encode_entry_header(PackEntryType::RefDelta, delta.len() as u64));
        self.buf.extend_from_slice(base.as_bytes());
        let compressed = zlib_compress(delta)?;
        self.buf.extend_from_slice(&compressed);
        Ok(self.end_entry(start))
    }

    /// Appends the SHA-256 trailer and returns the pack bytes with their
    /// checksum. Fails if fewer entries were written than promised.
    pub fn finish(mut self) -> GotResult<(Vec<u8>, ObjectHash)> {
        if self.written_count != self.expected_count {
            return Err(GotError::PreconditionFailed(format!(
                "pack expected {} entries, wrote {}",
                self.expected_count, self.written_count
            )));
        }
        let checksum = ObjectHash::from_digest(Sha256::digest(&self.buf).into());
        self.buf.extend_from_slice(checksum.as_bytes());
        Ok((self.buf, checksum))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::error::GotError;
    use crate::pack::read_pack;

    #[test]
    fn test_refuses_extra_entries() {
        let mut writer = PackWriter::new(1);
        writer.write_object(ObjectType::Blob, b"one").unwrap();
        assert_matches!(
            writer.write_object(ObjectType::Blob, b"two"),
            Err(GotError::PreconditionFailed(_))
        );
    }

    #[test]
    fn test_refuses_short_finish() {
        let mut writer = PackWriter::new(2);
        writer.write_object(ObjectType::Blob, b"one").unwrap();
        assert_matches!(writer.finish(), Err(GotError::PreconditionFailed(_)));
    }

    #[test]
    fn test_refuses_forward_ofs_base() {
        let mut writer = PackWriter::new(1);
        let next = writer.offset();
        assert_matches!(
            writer.write_ofs_delta(next, b"delta"),
            Err(GotError::PreconditionFailed(_))
        );
    }

    #[test]
    fn test_trailer_covers_written_bytes() {
        let mut writer = PackWriter::new(1);
        writer.write_object(ObjectType::Blob, b"hello\n").unwrap();
        let (bytes, checksum) = writer.finish().unwrap();
        assert_eq!(&bytes[bytes.len() - 32..], checksum.as_bytes());
        // The reader agrees end to end.
        let pack = read_pack(&bytes).unwrap();
        assert_eq!(pack.checksum, checksum);
        assert_eq!(pack.entries.len(), 1);
    }
}
