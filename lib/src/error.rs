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

use std::path::PathBuf;

use thiserror::Error;

use crate::object::ObjectType;

/// Error for any core engine operation.
///
/// Variants are grouped by failure kind so callers can distinguish malformed
/// input, format violations, corruption, absence, and transport failures
/// without string matching.
#[derive(Debug, Error)]
pub enum GotError {
    #[error("Invalid object hash: {hash}")]
    InvalidHash { hash: String },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unknown object type: {token}")]
    UnknownObjectType { token: String },
    /// The bytes don't follow the declared layout (envelope, header line,
    /// pack entry, delta stream, index table).
    #[error("Malformed {what}: {reason}")]
    Format { what: String, reason: String },
    /// The bytes follow the layout but disagree with a recorded hash,
    /// length, or checksum.
    #[error("Corrupt {what}: {reason}")]
    Corrupt { what: String, reason: String },
    #[error("Object {hash} not found")]
    NotFound { hash: String },
    #[error("Ref {name} not found")]
    RefNotFound { name: String },
    #[error("Type mismatch for object {hash}: expected {expected}, found {actual}")]
    TypeMismatch {
        hash: String,
        expected: ObjectType,
        actual: ObjectType,
    },
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("Negotiation did not converge after {rounds} rounds")]
    NegotiationLimitExceeded { rounds: u32 },
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Cannot access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl GotError {
    /// Format error with a `what` naming the offending object or file.
    pub fn format(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Format {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Corruption error naming the offending object or file.
    pub fn corrupt(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

/// Failures talking to a remote peer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Structured error body returned by the remote.
    #[error("Remote error {code}: {error}")]
    Remote {
        code: String,
        error: String,
        detail: Option<String>,
    },
    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("Unexpected content type {content_type:?} for {url}")]
    ContentType { content_type: String, url: String },
    #[error("Response for {url} exceeds limit of {limit} bytes")]
    ResponseTooLarge { url: String, limit: usize },
    #[error("Request to {url} failed")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

pub type GotResult<T> = Result<T, GotError>;
