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

//! Content digests over typed envelopes.
//!
//! An object's identity is SHA-256 over `"<type> <length>\0<content>"`, not
//! over the bare content, so the same bytes stored under two types get two
//! distinct hashes.

use sha2::Digest as _;
use sha2::Sha256;

use crate::object::ObjectType;
use crate::object_id::ObjectHash;

/// SHA-256 of raw bytes, without an envelope. Used for entity body hashes.
pub fn hash_bytes(data: &[u8]) -> ObjectHash {
    ObjectHash::from_digest(Sha256::digest(data).into())
}

/// Builds the canonical envelope `"<type> <length>\0<content>"`.
pub fn envelope(object_type: ObjectType, content: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(content.len() + 16);
    bytes.extend_from_slice(object_type.as_str().as_bytes());
    bytes.push(b' ');
    bytes.extend_from_slice(content.len().to_string().as_bytes());
    bytes.push(b'\0');
    bytes.extend_from_slice(content);
    bytes
}

/// SHA-256 over the typed envelope of `content`. This is the store key of
/// every object.
pub fn hash_object(object_type: ObjectType, content: &[u8]) -> ObjectHash {
    let mut hasher = Sha256::new();
    hasher.update(object_type.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(content.len().to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(content);
    ObjectHash::from_digest(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes_is_plain_sha256() {
        // sha256("hello")
        assert_eq!(
            hash_bytes(b"hello").hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_hash_object_matches_envelope_digest() {
        let content = b"hello\n";
        assert_eq!(
            hash_object(ObjectType::Blob, content),
            hash_bytes(&envelope(ObjectType::Blob, content))
        );
    }

    #[test]
    fn test_type_tag_separates_hash_spaces() {
        let content = b"payload";
        assert_ne!(
            hash_object(ObjectType::Blob, content),
            hash_object(ObjectType::Entity, content)
        );
    }

    #[test]
    fn test_hex_output_shape() {
        let hex = hash_object(ObjectType::Commit, b"x").hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }
}
