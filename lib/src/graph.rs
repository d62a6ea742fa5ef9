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

//! Typed reference enumeration and reachability over the object graph.
//!
//! Hashes forbid cycles, so the graph is a DAG and traversal only needs a
//! seen set.

use std::collections::HashSet;

use crate::codec;
use crate::error::GotResult;
use crate::object::Object;
use crate::object::ObjectType;
use crate::object_id::ObjectHash;
use crate::store::Store;

/// Enumerates the hashes an object of the given type refers to, in the order
/// they appear in the serialized form.
pub fn referenced(object_type: ObjectType, content: &[u8]) -> GotResult<Vec<ObjectHash>> {
    match object_type {
        // Leaves of the graph.
        ObjectType::Blob | ObjectType::Entity => Ok(vec![]),
        _ => match codec::decode(object_type, content)? {
            Object::Tag(tag) => Ok(vec![tag.target_hash]),
            Object::Commit(commit) => {
                let mut refs = vec![commit.tree_hash];
                refs.extend(commit.parents);
                Ok(refs)
            }
            Object::Tree(tree) => {
                let mut refs = Vec::new();
                for entry in &tree.entries {
                    if entry.is_dir {
                        refs.extend(entry.subtree_hash);
                    } else {
                        refs.extend(entry.blob_hash);
                        refs.extend(entry.entity_list_hash);
                    }
                }
                Ok(refs)
            }
            Object::EntityList(list) => Ok(list.entity_refs),
            Object::Blob(_) | Object::Entity(_) => unreachable!(),
        },
    }
}

/// Depth-first closure over `referenced`, computed over what the local store
/// holds: hashes absent locally are skipped, not errors.
pub fn reachable_set(store: &Store, roots: &[ObjectHash]) -> GotResult<HashSet<ObjectHash>> {
    let mut visited = HashSet::new();
    let mut present = HashSet::new();
    let mut stack: Vec<ObjectHash> = roots.to_vec();
    while let Some(hash) = stack.pop() {
        if !visited.insert(hash) {
            continue;
        }
        if !store.has(&hash)? {
            continue;
        }
        present.insert(hash);
        let (object_type, content) = store.read(&hash)?;
        for child in referenced(object_type, &content)? {
            if !visited.contains(&child) {
                stack.push(child);
            }
        }
    }
    Ok(present)
}
