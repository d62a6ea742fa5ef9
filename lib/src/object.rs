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

use std::fmt;

use crate::hash::hash_bytes;
use crate::object_id::ObjectHash;

/// The six object kinds of the store.
///
/// The token returned by [`ObjectType::as_str`] is the tag written into the
/// object envelope and hashed along with the content, so the mapping is part
/// of the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tag,
    Entity,
    EntityList,
    Tree,
    Commit,
}

impl ObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tag => "tag",
            Self::Entity => "entity",
            Self::EntityList => "entitylist",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "blob" => Some(Self::Blob),
            "tag" => Some(Self::Tag),
            "entity" => Some(Self::Entity),
            "entitylist" => Some(Self::EntityList),
            "tree" => Some(Self::Tree),
            "commit" => Some(Self::Commit),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for ObjectType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for ObjectType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        Self::from_token(&token)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown object type: {token}")))
    }
}

/// One code declaration extracted from a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Extractor-level category, e.g. "function" or "type".
    pub kind: String,
    pub name: String,
    /// Language-level declaration keyword, e.g. "fn" or "struct".
    pub decl_kind: String,
    /// Receiver for methods; empty for free-standing declarations.
    pub receiver: String,
    /// Digest of `body` alone, independent of the header fields.
    pub body_hash: ObjectHash,
    pub body: Vec<u8>,
}

impl Entity {
    /// Builds an entity, computing `body_hash` from `body`.
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        decl_kind: impl Into<String>,
        receiver: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        let body_hash = hash_bytes(&body);
        Self {
            kind: kind.into(),
            name: name.into(),
            decl_kind: decl_kind.into(),
            receiver: receiver.into(),
            body_hash,
            body,
        }
    }
}

/// The declarations of one file, in parse order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityList {
    pub language: String,
    pub path: String,
    /// Entity hashes in source order. Order is significant and preserved.
    pub entity_refs: Vec<ObjectHash>,
}

/// Git-compatible mode token of a directory tree entry.
pub const MODE_DIR: &str = "40000";
/// Mode token of a regular file entry.
pub const MODE_FILE: &str = "100644";
/// Mode token of an executable file entry.
pub const MODE_EXECUTABLE: &str = "100755";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub is_dir: bool,
    pub mode: String,
    pub blob_hash: Option<ObjectHash>,
    pub entity_list_hash: Option<ObjectHash>,
    pub subtree_hash: Option<ObjectHash>,
}

impl TreeEntry {
    pub fn dir(name: impl Into<String>, subtree_hash: ObjectHash) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            mode: MODE_DIR.to_owned(),
            blob_hash: None,
            entity_list_hash: None,
            subtree_hash: Some(subtree_hash),
        }
    }

    pub fn file(
        name: impl Into<String>,
        blob_hash: ObjectHash,
        entity_list_hash: Option<ObjectHash>,
    ) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            mode: MODE_FILE.to_owned(),
            blob_hash: Some(blob_hash),
            entity_list_hash,
            subtree_hash: None,
        }
    }
}

/// A directory snapshot. Entries are kept in the order given; the codec
/// sorts by name when serializing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

/// An annotated tag. `target_hash` keeps graph traversal inside this
/// system's hash space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub target_hash: ObjectHash,
    pub tagger: String,
    /// Seconds since the epoch.
    pub timestamp: i64,
    pub message: String,
}

/// A commit. Header fields mirror the canonical serialization; optional
/// committer fields stay `None` when the committer equals the author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree_hash: ObjectHash,
    pub parents: Vec<ObjectHash>,
    pub author: String,
    /// Author time, seconds since the epoch.
    pub timestamp: i64,
    /// Author timezone as `±HHMM`.
    pub author_timezone: Option<String>,
    pub committer: Option<String>,
    pub committer_timestamp: Option<i64>,
    pub committer_timezone: Option<String>,
    /// Detached signature over the canonical serialization with this field
    /// cleared. Empty means unsigned.
    pub signature: String,
    pub message: String,
}

impl Commit {
    /// The committer, falling back to the author when not recorded.
    pub fn effective_committer(&self) -> &str {
        self.committer.as_deref().unwrap_or(&self.author)
    }

    /// The committer timestamp, falling back to the author timestamp.
    pub fn effective_committer_timestamp(&self) -> i64 {
        self.committer_timestamp.unwrap_or(self.timestamp)
    }
}

/// A decoded object of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Vec<u8>),
    Tag(Tag),
    Entity(Entity),
    EntityList(EntityList),
    Tree(Tree),
    Commit(Commit),
}

impl Object {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Blob(_) => ObjectType::Blob,
            Self::Tag(_) => ObjectType::Tag,
            Self::Entity(_) => ObjectType::Entity,
            Self::EntityList(_) => ObjectType::EntityList,
            Self::Tree(_) => ObjectType::Tree,
            Self::Commit(_) => ObjectType::Commit,
        }
    }
}
