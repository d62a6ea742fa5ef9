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

//! The content-addressed object identifier.

use std::fmt;
use std::fmt::Debug;

use crate::error::GotError;
use crate::error::GotResult;
use crate::hex_util;

/// SHA-256 identifier of a stored object.
///
/// The textual form is exactly 64 lowercase hex digits; every other spelling
/// is rejected on parse. The binary form is the raw 32 digest bytes, used by
/// pack and index files.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectHash([u8; 32]);

impl ObjectHash {
    /// Digest length in bytes.
    pub const LEN: usize = 32;
    /// Length of the hex form.
    pub const HEX_LEN: usize = 64;

    pub(crate) fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// Reconstructs a hash from raw digest bytes, e.g. a 32-byte field in a
    /// pack or index file. Returns `None` when `bytes` has the wrong length.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let digest: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(digest))
    }

    /// Parses the given hex string into an `ObjectHash`.
    ///
    /// The given string must be valid. A static str is required to prevent
    /// API misuse.
    pub fn from_hex(hex: &'static str) -> Self {
        Self::try_from_hex(hex).unwrap()
    }

    /// Parses 64 lowercase hex digits into an `ObjectHash`.
    pub fn try_from_hex(hex: impl AsRef<[u8]>) -> Option<Self> {
        let hex = hex.as_ref();
        if hex.len() != Self::HEX_LEN {
            return None;
        }
        let bytes = hex_util::decode_hex(hex)?;
        Self::from_bytes(&bytes)
    }

    /// Parses a hash received from the outside, mapping bad spellings to the
    /// invalid-hash error.
    pub fn parse(hex: &str) -> GotResult<Self> {
        Self::try_from_hex(hex).ok_or_else(|| GotError::InvalidHash {
            hash: hex.to_owned(),
        })
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// First byte of the digest, the pack index fanout key.
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Returns the 64-digit lowercase hex representation.
    pub fn hex(&self) -> String {
        hex_util::encode_hex(&self.0)
    }
}

impl Debug for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("ObjectHash").field(&self.hex()).finish()
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.pad(&self.hex())
    }
}

impl serde::Serialize for ObjectHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            self.hex().serialize(serializer)
        } else {
            self.as_bytes().serialize(serializer)
        }
    }
}

impl<'de> serde::Deserialize<'de> for ObjectHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let hex = String::deserialize(deserializer)?;
            Self::try_from_hex(&hex)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid object hash: {hex}")))
        } else {
            let bytes = Vec::<u8>::deserialize(deserializer)?;
            Self::from_bytes(&bytes)
                .ok_or_else(|| serde::de::Error::custom("invalid object hash length"))
        }
    }
}
