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

//! The delta stream: two size varints, then copy and insert commands.
//!
//! A command byte with the top bit set copies a range of the base; which
//! offset and size bytes follow is selected by bits 0-3 and 4-6. A command
//! byte in (0, 127] inserts that many literal bytes. Command byte 0 is
//! invalid. The only builder shipped is insert-only; the applier accepts the
//! full command set.

use crate::error::GotError;
use crate::error::GotResult;

const WHAT: &str = "delta stream";

/// Copy size 0 means this many bytes.
const COPY_SIZE_ZERO: u64 = 0x10000;

fn write_size(out: &mut Vec<u8>, mut n: u64) {
    loop {
        let mut byte = (n & 0x7f) as u8;
        n >>= 7;
        if n > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if n == 0 {
            break;
        }
    }
}

fn read_size(data: &[u8], pos: &mut usize) -> GotResult<u64> {
    let mut value = 0u64;
    let mut shift = 0;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| GotError::format(WHAT, "truncated size varint"))?;
        *pos += 1;
        if shift > 63 {
            return Err(GotError::format(WHAT, "size varint too long"));
        }
        value |= u64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
}

/// Builds a delta that reproduces `target` without copying from `base`:
/// the size header followed by literal inserts. Used when no real diff is
/// available; the result is valid against any base of the right size.
pub fn build_insert_only_delta(base: &[u8], target: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(target.len() + 16);
    write_size(&mut out, base.len() as u64);
    write_size(&mut out, target.len() as u64);
    for chunk in target.chunks(0x7f) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out
}

/// Applies a delta stream to `base`, validating every bound along the way.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> GotResult<Vec<u8>> {
    let mut pos = 0;
    let base_size = read_size(delta, &mut pos)?;
    if base_size != base.len() as u64 {
        return Err(GotError::corrupt(
            WHAT,
            format!("base size {base_size} but base is {} bytes", base.len()),
        ));
    }
    let result_size = read_size(delta, &mut pos)?;
    let mut result = Vec::with_capacity(result_size.min(1 << 24) as usize);
    while pos < delta.len() {
        let command = delta[pos];
        pos += 1;
        if command & 0x80 != 0 {
            // Copy from base: offset bytes selected by bits 0-3, size bytes
            // by bits 4-6, little-endian by position.
            let mut offset = 0u64;
            for i in 0..4 {
                if command & (1 << i) != 0 {
                    let byte = *delta
                        .get(pos)
                        .ok_or_else(|| GotError::format(WHAT, "truncated copy offset"))?;
                    pos += 1;
                    offset |= u64::from(byte) << (8 * i);
                }
            }
            let mut size = 0u64;
            for i in 0..3 {
                if command & (1 << (4 + i)) != 0 {
                    let byte = *delta
                        .get(pos)
                        .ok_or_else(|| GotError::format(WHAT, "truncated copy size"))?;
                    pos += 1;
                    size |= u64::from(byte) << (8 * i);
                }
            }
            if size == 0 {
                size = COPY_SIZE_ZERO;
            }
            let end = offset
                .checked_add(size)
                .ok_or_else(|| GotError::format(WHAT, "copy range overflow"))?;
            if end > base.len() as u64 {
                return Err(GotError::format(
                    WHAT,
                    format!("copy range {offset}+{size} outside base of {} bytes", base.len()),
                ));
            }
            result.extend_from_slice(&base[offset as usize..end as usize]);
        } else if command != 0 {
            let n = usize::from(command);
            let chunk = delta
                .get(pos..pos + n)
                .ok_or_else(|| GotError::format(WHAT, "truncated insert"))?;
            result.extend_from_slice(chunk);
            pos += n;
        } else {
            return Err(GotError::format(WHAT, "command byte 0"));
        }
    }
    if result.len() as u64 != result_size {
        return Err(GotError::corrupt(
            WHAT,
            format!("result is {} bytes, header says {result_size}", result.len()),
        ));
    }
    Ok(result)
}
