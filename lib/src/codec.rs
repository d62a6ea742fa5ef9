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

//! Canonical byte formats of the six object kinds.
//!
//! Encoders are deterministic: equal logical values serialize to identical
//! bytes on every host, which is what makes the hashes stable. Header-style
//! kinds (entity, entity list, tag, commit) serialize as `key value` lines,
//! a blank line, then the body; trees serialize one entry per line; blobs
//! are raw bytes.

use std::fmt::Write as _;

use crate::error::GotError;
use crate::error::GotResult;
use crate::object::Commit;
use crate::object::Entity;
use crate::object::EntityList;
use crate::object::MODE_DIR;
use crate::object::MODE_EXECUTABLE;
use crate::object::MODE_FILE;
use crate::object::Object;
use crate::object::ObjectType;
use crate::object::Tag;
use crate::object::Tree;
use crate::object::TreeEntry;
use crate::object_id::ObjectHash;

/// Splits a loose-object envelope `"<type> <len>\0<content>"` into its type
/// and content, validating the declared length.
pub fn split_envelope(bytes: &[u8]) -> GotResult<(ObjectType, &[u8])> {
    let nul = bytes
        .iter()
        .position(|&b| b == b'\0')
        .ok_or_else(|| GotError::format("object envelope", "missing NUL separator"))?;
    let header = std::str::from_utf8(&bytes[..nul])
        .map_err(|_| GotError::format("object envelope", "header is not UTF-8"))?;
    let (token, len) = header
        .split_once(' ')
        .ok_or_else(|| GotError::format("object envelope", "missing space in header"))?;
    let object_type = ObjectType::from_token(token).ok_or_else(|| GotError::UnknownObjectType {
        token: token.to_owned(),
    })?;
    let declared: usize = len
        .parse()
        .map_err(|_| GotError::format("object envelope", format!("bad length {len:?}")))?;
    let content = &bytes[nul + 1..];
    if declared != content.len() {
        return Err(GotError::corrupt(
            "object envelope",
            format!("declared length {declared} but content is {} bytes", content.len()),
        ));
    }
    Ok((object_type, content))
}

/// Encodes any object to its canonical content bytes (without envelope).
pub fn encode(object: &Object) -> GotResult<Vec<u8>> {
    match object {
        Object::Blob(data) => Ok(data.clone()),
        Object::Tag(tag) => encode_tag(tag),
        Object::Entity(entity) => encode_entity(entity),
        Object::EntityList(list) => encode_entity_list(list),
        Object::Tree(tree) => encode_tree(tree),
        Object::Commit(commit) => encode_commit(commit),
    }
}

/// Decodes content bytes of a known type.
pub fn decode(object_type: ObjectType, content: &[u8]) -> GotResult<Object> {
    match object_type {
        ObjectType::Blob => Ok(Object::Blob(content.to_vec())),
        ObjectType::Tag => decode_tag(content).map(Object::Tag),
        ObjectType::Entity => decode_entity(content).map(Object::Entity),
        ObjectType::EntityList => decode_entity_list(content).map(Object::EntityList),
        ObjectType::Tree => decode_tree(content).map(Object::Tree),
        ObjectType::Commit => decode_commit(content).map(Object::Commit),
    }
}

fn push_header(out: &mut String, what: &str, key: &str, value: &str) -> GotResult<()> {
    if value.contains('\n') {
        return Err(GotError::format(
            what,
            format!("header {key} must not contain newlines"),
        ));
    }
    let _ = writeln!(out, "{key} {value}");
    Ok(())
}

/// Splits header-style content into its header lines and raw body.
fn split_headers<'a>(content: &'a [u8], what: &str) -> GotResult<(&'a str, &'a [u8])> {
    let pos = content
        .windows(2)
        .position(|w| w == b"\n\n")
        .ok_or_else(|| GotError::format(what, "missing blank-line separator"))?;
    let headers = std::str::from_utf8(&content[..pos + 1])
        .map_err(|_| GotError::format(what, "header is not UTF-8"))?;
    Ok((headers, &content[pos + 2..]))
}

fn header_lines<'a>(
    headers: &'a str,
    what: &str,
) -> impl Iterator<Item = GotResult<(&'a str, &'a str)>> {
    let what = what.to_owned();
    headers.lines().map(move |line| {
        line.split_once(' ').ok_or_else(|| {
            GotError::format(what.as_str(), format!("malformed header line {line:?}"))
        })
    })
}

fn parse_hash_value(value: &str, what: &str, key: &str) -> GotResult<ObjectHash> {
    ObjectHash::try_from_hex(value)
        .ok_or_else(|| GotError::format(what, format!("bad hash in header {key}: {value:?}")))
}

fn parse_int_value(value: &str, what: &str, key: &str) -> GotResult<i64> {
    value
        .parse()
        .map_err(|_| GotError::format(what, format!("bad integer in header {key}: {value:?}")))
}

fn set_once<T>(slot: &mut Option<T>, value: T, what: &str, key: &str) -> GotResult<()> {
    if slot.is_some() {
        return Err(GotError::format(what, format!("duplicate header {key}")));
    }
    *slot = Some(value);
    Ok(())
}

pub fn encode_entity(entity: &Entity) -> GotResult<Vec<u8>> {
    const WHAT: &str = "entity";
    let mut out = String::new();
    push_header(&mut out, WHAT, "kind", &entity.kind)?;
    push_header(&mut out, WHAT, "name", &entity.name)?;
    push_header(&mut out, WHAT, "declkind", &entity.decl_kind)?;
    if !entity.receiver.is_empty() {
        push_header(&mut out, WHAT, "receiver", &entity.receiver)?;
    }
    push_header(&mut out, WHAT, "bodyhash", &entity.body_hash.hex())?;
    out.push('\n');
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(&entity.body);
    Ok(bytes)
}

pub fn decode_entity(content: &[u8]) -> GotResult<Entity> {
    const WHAT: &str = "entity";
    let (headers, body) = split_headers(content, WHAT)?;
    let mut kind = None;
    let mut name = None;
    let mut decl_kind = None;
    let mut receiver = None;
    let mut body_hash = None;
    for line in header_lines(headers, WHAT) {
        let (key, value) = line?;
        match key {
            "kind" => set_once(&mut kind, value.to_owned(), WHAT, key)?,
            "name" => set_once(&mut name, value.to_owned(), WHAT, key)?,
            "declkind" => set_once(&mut decl_kind, value.to_owned(), WHAT, key)?,
            "receiver" => set_once(&mut receiver, value.to_owned(), WHAT, key)?,
            "bodyhash" => {
                set_once(&mut body_hash, parse_hash_value(value, WHAT, key)?, WHAT, key)?;
            }
            _ => return Err(GotError::format(WHAT, format!("unknown header key {key:?}"))),
        }
    }
    let missing = |key| GotError::format(WHAT, format!("missing header {key}"));
    Ok(Entity {
        kind: kind.ok_or_else(|| missing("kind"))?,
        name: name.ok_or_else(|| missing("name"))?,
        decl_kind: decl_kind.ok_or_else(|| missing("declkind"))?,
        receiver: receiver.unwrap_or_default(),
        body_hash: body_hash.ok_or_else(|| missing("bodyhash"))?,
        body: body.to_vec(),
    })
}

pub fn encode_entity_list(list: &EntityList) -> GotResult<Vec<u8>> {
    const WHAT: &str = "entity list";
    let mut out = String::new();
    push_header(&mut out, WHAT, "language", &list.language)?;
    push_header(&mut out, WHAT, "path", &list.path)?;
    out.push('\n');
    for hash in &list.entity_refs {
        let _ = writeln!(out, "{hash}");
    }
    Ok(out.into_bytes())
}

pub fn decode_entity_list(content: &[u8]) -> GotResult<EntityList> {
    const WHAT: &str = "entity list";
    let (headers, body) = split_headers(content, WHAT)?;
    let mut language = None;
    let mut path = None;
    for line in header_lines(headers, WHAT) {
        let (key, value) = line?;
        match key {
            "language" => set_once(&mut language, value.to_owned(), WHAT, key)?,
            "path" => set_once(&mut path, value.to_owned(), WHAT, key)?,
            _ => return Err(GotError::format(WHAT, format!("unknown header key {key:?}"))),
        }
    }
    let body = std::str::from_utf8(body)
        .map_err(|_| GotError::format(WHAT, "reference list is not UTF-8"))?;
    let mut entity_refs = Vec::new();
    for line in body.lines() {
        entity_refs.push(
            ObjectHash::try_from_hex(line)
                .ok_or_else(|| GotError::format(WHAT, format!("bad entity hash {line:?}")))?,
        );
    }
    let missing = |key| GotError::format(WHAT, format!("missing header {key}"));
    Ok(EntityList {
        language: language.ok_or_else(|| missing("language"))?,
        path: path.ok_or_else(|| missing("path"))?,
        entity_refs,
    })
}

fn validate_tree_entry(entry: &TreeEntry) -> GotResult<()> {
    const WHAT: &str = "tree entry";
    if entry.name.is_empty() {
        return Err(GotError::format(WHAT, "empty name"));
    }
    if entry.name.contains([' ', '\n', '\0']) {
        return Err(GotError::format(
            WHAT,
            format!("name {:?} contains a reserved character", entry.name),
        ));
    }
    match entry.mode.as_str() {
        MODE_DIR => {
            if !entry.is_dir || entry.subtree_hash.is_none() {
                return Err(GotError::format(
                    WHAT,
                    format!("directory entry {:?} without a subtree", entry.name),
                ));
            }
        }
        MODE_FILE | MODE_EXECUTABLE => {
            if entry.is_dir || entry.blob_hash.is_none() {
                return Err(GotError::format(
                    WHAT,
                    format!("file entry {:?} without a blob", entry.name),
                ));
            }
        }
        other => {
            return Err(GotError::format(WHAT, format!("unknown mode {other:?}")));
        }
    }
    Ok(())
}

fn hash_field(hash: Option<&ObjectHash>) -> String {
    hash.map_or_else(|| "-".to_owned(), ObjectHash::hex)
}

fn parse_hash_field(field: &str, what: &str) -> GotResult<Option<ObjectHash>> {
    if field == "-" {
        return Ok(None);
    }
    ObjectHash::try_from_hex(field)
        .map(Some)
        .ok_or_else(|| GotError::format(what, format!("bad hash field {field:?}")))
}

/// Encodes a tree, sorting entries by name. Duplicate names are rejected so
/// the serialized form is strictly ascending.
pub fn encode_tree(tree: &Tree) -> GotResult<Vec<u8>> {
    let mut entries: Vec<&TreeEntry> = tree.entries.iter().collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        validate_tree_entry(entry)?;
        if i > 0 && entries[i - 1].name == entry.name {
            return Err(GotError::format(
                "tree",
                format!("duplicate entry name {:?}", entry.name),
            ));
        }
        let _ = writeln!(
            out,
            "{} {} {} {} {}",
            entry.name,
            entry.mode,
            hash_field(entry.blob_hash.as_ref()),
            hash_field(entry.entity_list_hash.as_ref()),
            hash_field(entry.subtree_hash.as_ref()),
        );
    }
    Ok(out.into_bytes())
}

pub fn decode_tree(content: &[u8]) -> GotResult<Tree> {
    const WHAT: &str = "tree";
    let content =
        std::str::from_utf8(content).map_err(|_| GotError::format(WHAT, "not UTF-8"))?;
    let mut entries = Vec::new();
    for line in content.lines() {
        let fields: Vec<&str> = line.split(' ').collect();
        let [name, mode, blob, entity_list, subtree] = fields[..] else {
            return Err(GotError::format(WHAT, format!("malformed entry {line:?}")));
        };
        // Legacy trees spell the mode as a word instead of a numeric token.
        let mode = match mode {
            "dir" => MODE_DIR,
            "file" => MODE_FILE,
            MODE_DIR | MODE_FILE | MODE_EXECUTABLE => mode,
            other => {
                return Err(GotError::format(WHAT, format!("unknown mode {other:?}")));
            }
        };
        entries.push(TreeEntry {
            name: name.to_owned(),
            is_dir: mode == MODE_DIR,
            mode: mode.to_owned(),
            blob_hash: parse_hash_field(blob, WHAT)?,
            entity_list_hash: parse_hash_field(entity_list, WHAT)?,
            subtree_hash: parse_hash_field(subtree, WHAT)?,
        });
    }
    Ok(Tree { entries })
}

pub fn encode_tag(tag: &Tag) -> GotResult<Vec<u8>> {
    const WHAT: &str = "tag";
    let mut out = String::new();
    push_header(&mut out, WHAT, "target", &tag.target_hash.hex())?;
    push_header(&mut out, WHAT, "tag", &tag.name)?;
    push_header(&mut out, WHAT, "tagger", &tag.tagger)?;
    push_header(&mut out, WHAT, "timestamp", &tag.timestamp.to_string())?;
    out.push('\n');
    out.push_str(&tag.message);
    Ok(out.into_bytes())
}

pub fn decode_tag(content: &[u8]) -> GotResult<Tag> {
    const WHAT: &str = "tag";
    let (headers, body) = split_headers(content, WHAT)?;
    let mut target_hash = None;
    let mut name = None;
    let mut tagger = None;
    let mut timestamp = None;
    for line in header_lines(headers, WHAT) {
        let (key, value) = line?;
        match key {
            "target" => {
                set_once(&mut target_hash, parse_hash_value(value, WHAT, key)?, WHAT, key)?;
            }
            "tag" => set_once(&mut name, value.to_owned(), WHAT, key)?,
            "tagger" => set_once(&mut tagger, value.to_owned(), WHAT, key)?,
            "timestamp" => {
                set_once(&mut timestamp, parse_int_value(value, WHAT, key)?, WHAT, key)?;
            }
            _ => return Err(GotError::format(WHAT, format!("unknown header key {key:?}"))),
        }
    }
    let message = std::str::from_utf8(body)
        .map_err(|_| GotError::format(WHAT, "message is not UTF-8"))?
        .to_owned();
    Ok(Tag {
        name: name.unwrap_or_default(),
        target_hash: target_hash
            .ok_or_else(|| GotError::format(WHAT, "missing header target"))?,
        tagger: tagger.unwrap_or_default(),
        timestamp: timestamp.unwrap_or(0),
        message,
    })
}

pub fn encode_commit(commit: &Commit) -> GotResult<Vec<u8>> {
    const WHAT: &str = "commit";
    let mut out = String::new();
    push_header(&mut out, WHAT, "tree", &commit.tree_hash.hex())?;
    for parent in &commit.parents {
        push_header(&mut out, WHAT, "parent", &parent.hex())?;
    }
    push_header(&mut out, WHAT, "author", &commit.author)?;
    push_header(&mut out, WHAT, "timestamp", &commit.timestamp.to_string())?;
    if let Some(tz) = &commit.author_timezone {
        push_header(&mut out, WHAT, "tz", tz)?;
    }
    if let Some(committer) = &commit.committer {
        push_header(&mut out, WHAT, "committer", committer)?;
    }
    if let Some(ts) = commit.committer_timestamp {
        push_header(&mut out, WHAT, "committer_timestamp", &ts.to_string())?;
    }
    if let Some(tz) = &commit.committer_timezone {
        push_header(&mut out, WHAT, "committer_tz", tz)?;
    }
    if !commit.signature.is_empty() {
        push_header(&mut out, WHAT, "signature", &commit.signature)?;
    }
    out.push('\n');
    out.push_str(&commit.message);
    Ok(out.into_bytes())
}

pub fn decode_commit(content: &[u8]) -> GotResult<Commit> {
    const WHAT: &str = "commit";
    let (headers, body) = split_headers(content, WHAT)?;
    let mut tree_hash = None;
    let mut parents = Vec::new();
    let mut author = None;
    let mut timestamp = None;
    let mut author_timezone = None;
    let mut committer = None;
    let mut committer_timestamp = None;
    let mut committer_timezone = None;
    let mut signature = None;
    for line in header_lines(headers, WHAT) {
        let (key, value) = line?;
        match key {
            "tree" => set_once(&mut tree_hash, parse_hash_value(value, WHAT, key)?, WHAT, key)?,
            "parent" => parents.push(parse_hash_value(value, WHAT, key)?),
            "author" => set_once(&mut author, value.to_owned(), WHAT, key)?,
            "timestamp" => {
                set_once(&mut timestamp, parse_int_value(value, WHAT, key)?, WHAT, key)?;
            }
            "tz" => set_once(&mut author_timezone, value.to_owned(), WHAT, key)?,
            "committer" => set_once(&mut committer, value.to_owned(), WHAT, key)?,
            "committer_timestamp" => set_once(
                &mut committer_timestamp,
                parse_int_value(value, WHAT, key)?,
                WHAT,
                key,
            )?,
            "committer_tz" => set_once(&mut committer_timezone, value.to_owned(), WHAT, key)?,
            "signature" => set_once(&mut signature, value.to_owned(), WHAT, key)?,
            _ => return Err(GotError::format(WHAT, format!("unknown header key {key:?}"))),
        }
    }
    let message = std::str::from_utf8(body)
        .map_err(|_| GotError::format(WHAT, "message is not UTF-8"))?
        .to_owned();
    let missing = |key| GotError::format(WHAT, format!("missing header {key}"));
    Ok(Commit {
        tree_hash: tree_hash.ok_or_else(|| missing("tree"))?,
        parents,
        author: author.ok_or_else(|| missing("author"))?,
        timestamp: timestamp.ok_or_else(|| missing("timestamp"))?,
        author_timezone,
        committer,
        committer_timestamp,
        committer_timezone,
        signature: signature.unwrap_or_default(),
        message,
    })
}

/// The bytes a signature covers: the canonical serialization of the commit
/// with `signature` cleared.
pub fn commit_signing_payload(commit: &Commit) -> GotResult<Vec<u8>> {
    let mut unsigned = commit.clone();
    unsigned.signature = String::new();
    encode_commit(&unsigned)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::hash::hash_bytes;
    use crate::hash::hash_object;

    fn sample_hash(seed: &[u8]) -> ObjectHash {
        hash_bytes(seed)
    }

    fn sample_commit() -> Commit {
        Commit {
            tree_hash: sample_hash(b"tree"),
            parents: vec![sample_hash(b"p1"), sample_hash(b"p2")],
            author: "alice <alice@example.com>".to_owned(),
            timestamp: 1700000000,
            author_timezone: Some("+0200".to_owned()),
            committer: Some("bob <bob@example.com>".to_owned()),
            committer_timestamp: Some(1700000100),
            committer_timezone: Some("-0500".to_owned()),
            signature: String::new(),
            message: "Add the thing\n\nLonger explanation.\n".to_owned(),
        }
    }

    #[test]
    fn test_envelope_round_trip() {
        let bytes = crate::hash::envelope(ObjectType::Blob, b"hello\n");
        let (ty, content) = split_envelope(&bytes).unwrap();
        assert_eq!(ty, ObjectType::Blob);
        assert_eq!(content, b"hello\n");
    }

    #[test]
    fn test_envelope_rejects_bad_length() {
        assert_matches!(
            split_envelope(b"blob 99\0hello"),
            Err(GotError::Corrupt { .. })
        );
        assert_matches!(
            split_envelope(b"blob 5hello"),
            Err(GotError::Format { .. })
        );
        assert_matches!(
            split_envelope(b"widget 5\0hello"),
            Err(GotError::UnknownObjectType { token }) if token == "widget"
        );
    }

    #[test]
    fn test_entity_round_trip() {
        let entity = Entity::new(
            "function",
            "ServeHTTP",
            "func",
            "*Handler",
            b"func (h *Handler) ServeHTTP() {}\n".to_vec(),
        );
        let bytes = encode_entity(&entity).unwrap();
        assert_eq!(decode_entity(&bytes).unwrap(), entity);
    }

    #[test]
    fn test_entity_empty_receiver_is_omitted() {
        let entity = Entity::new("function", "main", "fn", "", b"fn main() {}".to_vec());
        let bytes = encode_entity(&entity).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(!text.contains("receiver"));
        assert_eq!(decode_entity(&bytes).unwrap(), entity);
    }

    #[test]
    fn test_entity_rejects_unknown_key() {
        let err =
            decode_entity(b"kind f\nname x\ndeclkind fn\ncolor red\n\nbody").unwrap_err();
        assert_matches!(err, GotError::Format { reason, .. } if reason.contains("color"));
    }

    #[test]
    fn test_entity_list_round_trip_preserves_order() {
        let list = EntityList {
            language: "rust".to_owned(),
            path: "src/lib.rs".to_owned(),
            entity_refs: vec![sample_hash(b"b"), sample_hash(b"a"), sample_hash(b"c")],
        };
        let bytes = encode_entity_list(&list).unwrap();
        let decoded = decode_entity_list(&bytes).unwrap();
        assert_eq!(decoded, list);
        // Source order, not sorted order.
        assert_eq!(decoded.entity_refs[0], sample_hash(b"b"));
    }

    #[test]
    fn test_tree_encodes_sorted() {
        let tree = Tree {
            entries: vec![
                TreeEntry::file("z.rs", sample_hash(b"z"), None),
                TreeEntry::file("a.rs", sample_hash(b"a"), Some(sample_hash(b"el"))),
            ],
        };
        let bytes = encode_tree(&tree).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("a.rs "));
        let decoded = decode_tree(&bytes).unwrap();
        assert_eq!(decoded.entries[0].name, "a.rs");
        assert_eq!(decoded.entries[1].name, "z.rs");
        assert_eq!(decoded.entries[0].entity_list_hash, Some(sample_hash(b"el")));
    }

    #[test]
    fn test_tree_rejects_duplicate_names() {
        let tree = Tree {
            entries: vec![
                TreeEntry::file("same", sample_hash(b"1"), None),
                TreeEntry::file("same", sample_hash(b"2"), None),
            ],
        };
        assert_matches!(encode_tree(&tree), Err(GotError::Format { .. }));
    }

    #[test]
    fn test_tree_accepts_legacy_mode_tokens() {
        let sub = sample_hash(b"sub");
        let blob = sample_hash(b"blob");
        let text = format!("docs dir - - {sub}\nreadme file {blob} - -\n");
        let tree = decode_tree(text.as_bytes()).unwrap();
        assert!(tree.entries[0].is_dir);
        assert_eq!(tree.entries[0].mode, MODE_DIR);
        assert_eq!(tree.entries[0].subtree_hash, Some(sub));
        assert!(!tree.entries[1].is_dir);
        assert_eq!(tree.entries[1].mode, MODE_FILE);
        assert_eq!(tree.entries[1].blob_hash, Some(blob));
    }

    #[test]
    fn test_tag_round_trip() {
        let tag = Tag {
            name: "v1.0.0".to_owned(),
            target_hash: sample_hash(b"commit"),
            tagger: "alice <alice@example.com>".to_owned(),
            timestamp: 1700000000,
            message: "Release 1.0.0\n".to_owned(),
        };
        let bytes = encode_tag(&tag).unwrap();
        assert_eq!(decode_tag(&bytes).unwrap(), tag);
    }

    #[test]
    fn test_commit_round_trip() {
        let commit = sample_commit();
        let bytes = encode_commit(&commit).unwrap();
        assert_eq!(decode_commit(&bytes).unwrap(), commit);

        let minimal = Commit {
            parents: vec![],
            author_timezone: None,
            committer: None,
            committer_timestamp: None,
            committer_timezone: None,
            ..sample_commit()
        };
        let bytes = encode_commit(&minimal).unwrap();
        assert_eq!(decode_commit(&bytes).unwrap(), minimal);
    }

    #[test]
    fn test_commit_rejects_unknown_key() {
        let tree = sample_hash(b"tree");
        let text = format!("tree {tree}\nauthor a\ntimestamp 1\nbranch main\n\nmsg");
        assert_matches!(
            decode_commit(text.as_bytes()),
            Err(GotError::Format { reason, .. }) if reason.contains("branch")
        );
    }

    #[test]
    fn test_commit_rejects_bad_integer() {
        let tree = sample_hash(b"tree");
        let text = format!("tree {tree}\nauthor a\ntimestamp soon\n\nmsg");
        assert_matches!(decode_commit(text.as_bytes()), Err(GotError::Format { .. }));
    }

    #[test]
    fn test_signature_changes_hash_but_not_signing_payload() {
        let unsigned = sample_commit();
        let mut signed = unsigned.clone();
        signed.signature = "deadbeef".to_owned();

        let unsigned_bytes = encode_commit(&unsigned).unwrap();
        let signed_bytes = encode_commit(&signed).unwrap();
        assert_ne!(
            hash_object(ObjectType::Commit, &unsigned_bytes),
            hash_object(ObjectType::Commit, &signed_bytes)
        );
        assert_eq!(commit_signing_payload(&signed).unwrap(), unsigned_bytes);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let commit = sample_commit();
        assert_eq!(
            encode_commit(&commit).unwrap(),
            encode_commit(&commit.clone()).unwrap()
        );
    }

    #[test]
    fn test_decode_dispatch() {
        let list = EntityList {
            language: "go".to_owned(),
            path: "main.go".to_owned(),
            entity_refs: vec![],
        };
        let bytes = encode(&Object::EntityList(list.clone())).unwrap();
        let decoded = decode(ObjectType::EntityList, &bytes).unwrap();
        assert_eq!(decoded, Object::EntityList(list));
    }
}
