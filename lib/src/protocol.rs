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

//! Wire protocol types and constants.
//!
//! JSON payloads are UTF-8 with binary data as base64 and hashes as 64-char
//! lowercase hex. Both sides identify the protocol with `Got-Protocol` and
//! advertise optional encodings with `Got-Capabilities`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::error::GotError;
use crate::error::GotResult;
use crate::object::ObjectType;
use crate::object_id::ObjectHash;

pub const HEADER_PROTOCOL: &str = "Got-Protocol";
pub const HEADER_CAPABILITIES: &str = "Got-Capabilities";
pub const HEADER_OBJECT_TYPE: &str = "X-Object-Type";
pub const HEADER_TRUNCATED: &str = "X-Truncated";

pub const PROTOCOL_VERSION: &str = "1";
pub const CAPABILITIES: &str = "pack,zstd,sideband";

pub const MEDIA_TYPE_JSON: &str = "application/json";
pub const MEDIA_TYPE_PACK: &str = "application/x-got-pack";
pub const MEDIA_TYPE_NDJSON: &str = "application/x-ndjson";

/// Response size limits, by endpoint.
pub const MAX_REFS_RESPONSE_BYTES: usize = 8 << 20;
pub const MAX_BATCH_RESPONSE_BYTES: usize = 64 << 20;
pub const MAX_OBJECT_RESPONSE_BYTES: usize = 32 << 20;
pub const MAX_GENERIC_RESPONSE_BYTES: usize = 2 << 20;

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::Deserialize as _;

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(&encoded)
            .map_err(|e| serde::de::Error::custom(format!("bad base64 payload: {e}")))
    }
}

/// One object on the wire: its claimed hash, type, and content bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub hash: ObjectHash,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchObjectsRequest {
    pub wants: Vec<ObjectHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub haves: Option<Vec<ObjectHash>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_objects: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchObjectsResponse {
    pub objects: Vec<ObjectRecord>,
    #[serde(default)]
    pub truncated: bool,
}

/// One requested ref move. `old` is the expected current value for the
/// remote's compare-and-swap; `new` of `None` deletes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefUpdate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<ObjectHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<ObjectHash>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRefsRequest {
    pub updates: Vec<RefUpdate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRefsResponse {
    /// Ref name to the hash it now points at.
    pub updated: BTreeMap<String, ObjectHash>,
}

/// The structured error body every endpoint uses on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteErrorBody {
    pub code: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Serializes records as newline-delimited JSON, the buffered push body.
pub fn encode_ndjson(records: &[ObjectRecord]) -> GotResult<Vec<u8>> {
    let mut out = Vec::new();
    for record in records {
        let line = serde_json::to_vec(record)
            .map_err(|e| GotError::format("object record", e.to_string()))?;
        out.extend_from_slice(&line);
        out.push(b'\n');
    }
    Ok(out)
}

/// Parses a newline-delimited JSON stream of records.
pub fn decode_ndjson(body: &[u8]) -> GotResult<Vec<ObjectRecord>> {
    let mut records = Vec::new();
    for (i, line) in body.split(|&b| b == b'\n').enumerate() {
        if line.is_empty() {
            continue;
        }
        records.push(
            serde_json::from_slice(line)
                .map_err(|e| GotError::format(format!("object record line {i}"), e.to_string()))?,
        );
    }
    Ok(records)
}
