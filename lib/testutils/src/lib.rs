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

#![allow(missing_docs)]

//! Helpers for got-lib tests: temp stores, object graph factories, and an
//! in-memory remote peer.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use got_lib::client::RemoteClient;
use got_lib::codec;
use got_lib::error::GotError;
use got_lib::error::GotResult;
use got_lib::error::TransportError;
use got_lib::graph::referenced;
use got_lib::hash::hash_object;
use got_lib::object::Commit;
use got_lib::object::ObjectType;
use got_lib::object::Tree;
use got_lib::object::TreeEntry;
use got_lib::object_id::ObjectHash;
use got_lib::protocol::BatchObjectsRequest;
use got_lib::protocol::BatchObjectsResponse;
use got_lib::protocol::ObjectRecord;
use got_lib::protocol::RefUpdate;
use got_lib::protocol::UpdateRefsResponse;
use got_lib::store::Store;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub fn new_temp_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("got-test-")
        .tempdir()
        .unwrap()
}

/// A store in a fresh temp directory. Keep the `TempDir` alive for as long
/// as the store is used.
pub fn new_temp_store() -> (TempDir, Store) {
    let temp_dir = new_temp_dir();
    let store = Store::init(&temp_dir.path().join("objects")).unwrap();
    (temp_dir, store)
}

pub fn commit_value(tree_hash: ObjectHash, parents: Vec<ObjectHash>, message: &str) -> Commit {
    Commit {
        tree_hash,
        parents,
        author: "test <test@example.com>".to_owned(),
        timestamp: 1700000000,
        author_timezone: None,
        committer: None,
        committer_timestamp: None,
        committer_timezone: None,
        signature: String::new(),
        message: message.to_owned(),
    }
}

/// A small but fully linked object graph: a commit pointing at a tree with
/// one source file, its blob, its entity list, and one entity.
#[derive(Debug, Clone)]
pub struct SampleGraph {
    pub commit: ObjectHash,
    pub tree: ObjectHash,
    pub blob: ObjectHash,
    pub entity_list: ObjectHash,
    pub entity: ObjectHash,
}

impl SampleGraph {
    pub fn all_hashes(&self) -> Vec<ObjectHash> {
        vec![self.commit, self.tree, self.blob, self.entity_list, self.entity]
    }
}

/// Writes a [`SampleGraph`] into the store. `seed` makes distinct graphs.
pub fn write_sample_graph(store: &Store, seed: &str) -> SampleGraph {
    let body = format!("fn {seed}() {{}}\n");
    let entity = got_lib::object::Entity::new("function", seed, "fn", "", body.into_bytes());
    let entity_bytes = codec::encode_entity(&entity).unwrap();
    let entity_hash = store.write(ObjectType::Entity, &entity_bytes).unwrap();

    let list = got_lib::object::EntityList {
        language: "rust".to_owned(),
        path: format!("src/{seed}.rs"),
        entity_refs: vec![entity_hash],
    };
    let list_bytes = codec::encode_entity_list(&list).unwrap();
    let list_hash = store.write(ObjectType::EntityList, &list_bytes).unwrap();

    let blob_hash = store
        .write(ObjectType::Blob, format!("contents of {seed}\n").as_bytes())
        .unwrap();

    let tree = Tree {
        entries: vec![TreeEntry::file(
            format!("{seed}.rs"),
            blob_hash,
            Some(list_hash),
        )],
    };
    let tree_bytes = codec::encode_tree(&tree).unwrap();
    let tree_hash = store.write(ObjectType::Tree, &tree_bytes).unwrap();

    let commit = commit_value(tree_hash, vec![], &format!("add {seed}"));
    let commit_bytes = codec::encode_commit(&commit).unwrap();
    let commit_hash = store.write(ObjectType::Commit, &commit_bytes).unwrap();

    SampleGraph {
        commit: commit_hash,
        tree: tree_hash,
        blob: blob_hash,
        entity_list: list_hash,
        entity: entity_hash,
    }
}

/// An in-memory peer implementing [`RemoteClient`].
///
/// Batch responses either come from a script (exact responses, in order) or
/// are computed from the held objects: the closure under `wants`, minus the
/// request's `haves`, capped at `max_objects` with the truncation flag set
/// when objects remain. Request counters support asserting how often each
/// endpoint was hit.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    objects: Mutex<HashMap<ObjectHash, (ObjectType, Vec<u8>)>>,
    refs: Mutex<BTreeMap<String, ObjectHash>>,
    scripted_batches: Mutex<VecDeque<BatchObjectsResponse>>,
    pub batch_requests: AtomicUsize,
    pub object_gets: AtomicUsize,
    batch_request_log: Mutex<Vec<BatchObjectsRequest>>,
    pushed: Mutex<Vec<ObjectRecord>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one object and returns its hash.
    pub fn add_object(&self, object_type: ObjectType, data: &[u8]) -> ObjectHash {
        let hash = hash_object(object_type, data);
        self.objects
            .lock()
            .unwrap()
            .insert(hash, (object_type, data.to_vec()));
        hash
    }

    /// Copies every object of a local store into the remote.
    pub fn add_store(&self, store: &Store, hashes: &[ObjectHash]) {
        for hash in hashes {
            let (object_type, data) = store.read(hash).unwrap();
            self.add_object(object_type, &data);
        }
    }

    pub fn set_ref(&self, name: &str, hash: ObjectHash) {
        self.refs.lock().unwrap().insert(name.to_owned(), hash);
    }

    /// Queues an exact batch response; scripted responses are served before
    /// any computed ones.
    pub fn script_batch(&self, response: BatchObjectsResponse) {
        self.scripted_batches.lock().unwrap().push_back(response);
    }

    pub fn record_for(&self, hash: &ObjectHash) -> Option<ObjectRecord> {
        let objects = self.objects.lock().unwrap();
        let (object_type, data) = objects.get(hash)?;
        Some(ObjectRecord {
            hash: *hash,
            object_type: *object_type,
            data: data.clone(),
        })
    }

    pub fn pushed_records(&self) -> Vec<ObjectRecord> {
        self.pushed.lock().unwrap().clone()
    }

    pub fn batch_requests_seen(&self) -> Vec<BatchObjectsRequest> {
        self.batch_request_log.lock().unwrap().clone()
    }

    pub fn unused_scripted_batches(&self) -> usize {
        self.scripted_batches.lock().unwrap().len()
    }

    /// The hashes reachable from `roots` among the held objects.
    pub fn reachable(&self, roots: &[ObjectHash]) -> HashSet<ObjectHash> {
        let objects = self.objects.lock().unwrap();
        let mut seen = HashSet::new();
        let mut stack: Vec<ObjectHash> = roots.to_vec();
        while let Some(hash) = stack.pop() {
            if !seen.insert(hash) {
                continue;
            }
            let Some((object_type, data)) = objects.get(&hash) else {
                seen.remove(&hash);
                continue;
            };
            stack.extend(referenced(*object_type, data).unwrap());
        }
        seen
    }

    fn computed_batch(&self, request: &BatchObjectsRequest) -> BatchObjectsResponse {
        let haves: HashSet<ObjectHash> = request
            .haves
            .iter()
            .flatten()
            .copied()
            .collect();
        let objects = self.objects.lock().unwrap();
        // Breadth-first from the wants, deterministic order.
        let mut order: Vec<ObjectHash> = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<ObjectHash> = request.wants.iter().copied().collect();
        while let Some(hash) = queue.pop_front() {
            if !seen.insert(hash) {
                continue;
            }
            let Some((object_type, data)) = objects.get(&hash) else {
                continue;
            };
            if !haves.contains(&hash) {
                order.push(hash);
            }
            queue.extend(referenced(*object_type, data).unwrap());
        }
        let limit = request.max_objects.unwrap_or(u32::MAX) as usize;
        let truncated = order.len() > limit;
        let records = order
            .into_iter()
            .take(limit)
            .map(|hash| {
                let (object_type, data) = &objects[&hash];
                ObjectRecord {
                    hash,
                    object_type: *object_type,
                    data: data.clone(),
                }
            })
            .collect();
        BatchObjectsResponse {
            objects: records,
            truncated,
        }
    }
}

#[async_trait]
impl RemoteClient for InMemoryRemote {
    async fn list_refs(
        &self,
        _cancel: &CancellationToken,
    ) -> GotResult<BTreeMap<String, ObjectHash>> {
        Ok(self.refs.lock().unwrap().clone())
    }

    async fn batch_objects(
        &self,
        request: &BatchObjectsRequest,
        cancel: &CancellationToken,
    ) -> GotResult<BatchObjectsResponse> {
        if cancel.is_cancelled() {
            return Err(GotError::Cancelled);
        }
        self.batch_requests.fetch_add(1, Ordering::SeqCst);
        self.batch_request_log.lock().unwrap().push(request.clone());
        if let Some(response) = self.scripted_batches.lock().unwrap().pop_front() {
            return Ok(response);
        }
        Ok(self.computed_batch(request))
    }

    async fn get_object(
        &self,
        hash: &ObjectHash,
        cancel: &CancellationToken,
    ) -> GotResult<ObjectRecord> {
        if cancel.is_cancelled() {
            return Err(GotError::Cancelled);
        }
        self.object_gets.fetch_add(1, Ordering::SeqCst);
        self.record_for(hash).ok_or_else(|| {
            TransportError::Status {
                status: 404,
                url: format!("memory:objects/{hash}"),
            }
            .into()
        })
    }

    async fn push_objects(
        &self,
        records: &[ObjectRecord],
        cancel: &CancellationToken,
    ) -> GotResult<()> {
        if cancel.is_cancelled() {
            return Err(GotError::Cancelled);
        }
        for record in records {
            self.add_object(record.object_type, &record.data);
        }
        self.pushed.lock().unwrap().extend(records.iter().cloned());
        Ok(())
    }

    async fn update_refs(
        &self,
        updates: &[RefUpdate],
        cancel: &CancellationToken,
    ) -> GotResult<UpdateRefsResponse> {
        if cancel.is_cancelled() {
            return Err(GotError::Cancelled);
        }
        let mut refs = self.refs.lock().unwrap();
        let mut updated = BTreeMap::new();
        for update in updates {
            match update.new {
                Some(new) => {
                    refs.insert(update.name.clone(), new);
                    updated.insert(update.name.clone(), new);
                }
                None => {
                    refs.remove(&update.name);
                }
            }
        }
        Ok(UpdateRefsResponse { updated })
    }
}
