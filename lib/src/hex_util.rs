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

//! Hex string helpers.
//!
//! Hashes cross the wire and the disk as lowercase hex. Producers emit
//! lowercase only; decoding rejects uppercase digits so that a hash has
//! exactly one textual spelling.

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

/// Encodes `data` as a lowercase hex string.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decodes a lowercase hex string. Returns `None` for odd length, uppercase
/// digits, or any non-hex byte.
pub fn decode_hex(hex: impl AsRef<[u8]>) -> Option<Vec<u8>> {
    let hex = hex.as_ref();
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut decoded = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.chunks_exact(2) {
        let [hi, lo] = chunk.try_into().unwrap();
        decoded.push(hex_value(hi)? << 4 | hex_value(lo)?);
    }
    Some(decoded)
}
