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

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use assert_matches::assert_matches;
use got_lib::codec;
use got_lib::error::GotError;
use got_lib::graph::reachable_set;
use got_lib::hash::hash_object;
use got_lib::object::ObjectType;
use got_lib::object::Tree;
use got_lib::object::TreeEntry;
use got_lib::object_id::ObjectHash;
use got_lib::protocol::BatchObjectsResponse;
use got_lib::protocol::ObjectRecord;
use got_lib::store::Store;
use got_lib::sync::FetchOptions;
use got_lib::sync::PushOptions;
use got_lib::sync::collect_objects_for_push;
use got_lib::sync::fetch_into_store;
use got_lib::sync::push_to_remote;
use pollster::FutureExt as _;
use testutils::InMemoryRemote;
use testutils::commit_value;
use testutils::new_temp_store;
use testutils::write_sample_graph;
use tokio_util::sync::CancellationToken;

/// A commit pointing at a tree with one plain file: exactly three objects.
fn three_object_chain(store: &Store) -> (ObjectHash, ObjectHash, ObjectHash) {
    let blob = store.write(ObjectType::Blob, b"file contents\n").unwrap();
    let tree = Tree {
        entries: vec![TreeEntry::file("file.txt", blob, None)],
    };
    let tree_hash = store
        .write(ObjectType::Tree, &codec::encode_tree(&tree).unwrap())
        .unwrap();
    let commit = commit_value(tree_hash, vec![], "chain");
    let commit_hash = store
        .write(ObjectType::Commit, &codec::encode_commit(&commit).unwrap())
        .unwrap();
    (commit_hash, tree_hash, blob)
}

fn batch(records: Vec<ObjectRecord>, truncated: bool) -> BatchObjectsResponse {
    BatchObjectsResponse {
        objects: records,
        truncated,
    }
}

#[test]
fn test_fetch_negotiation_rounds() {
    let (_server_temp, source) = new_temp_store();
    let (commit, tree, blob) = three_object_chain(&source);
    let remote = InMemoryRemote::new();
    remote.add_store(&source, &[commit, tree, blob]);

    // The server dribbles one object per round, then reports completion.
    remote.script_batch(batch(vec![remote.record_for(&commit).unwrap()], true));
    remote.script_batch(batch(vec![remote.record_for(&tree).unwrap()], true));
    remote.script_batch(batch(vec![remote.record_for(&blob).unwrap()], false));
    remote.script_batch(batch(vec![], false));

    let (_temp, store) = new_temp_store();
    let cancel = CancellationToken::new();
    let stats = fetch_into_store(
        &remote,
        &store,
        &[commit],
        &[],
        &FetchOptions::default(),
        &cancel,
    )
    .block_on()
    .unwrap();

    assert_eq!(remote.batch_requests.load(Ordering::SeqCst), 3);
    assert_eq!(remote.object_gets.load(Ordering::SeqCst), 0);
    assert_eq!(stats.rounds, 3);
    assert_eq!(stats.batch_objects, 3);
    assert_eq!(stats.closure_objects, 0);
    // The final canned response was never requested.
    assert_eq!(remote.unused_scripted_batches(), 1);
    for hash in [commit, tree, blob] {
        assert!(store.has(&hash).unwrap());
    }
}

#[test]
fn test_fetch_closure_fills_truncated_batches() {
    let (_server_temp, source) = new_temp_store();
    let graph = write_sample_graph(&source, "alpha");
    let remote = InMemoryRemote::new();
    remote.add_store(&source, &graph.all_hashes());

    // The batch endpoint only ever hands out the commit; the closure pass
    // must fetch the remaining four objects one by one.
    remote.script_batch(batch(vec![remote.record_for(&graph.commit).unwrap()], false));

    let (_temp, store) = new_temp_store();
    let cancel = CancellationToken::new();
    let stats = fetch_into_store(
        &remote,
        &store,
        &[graph.commit],
        &[],
        &FetchOptions::default(),
        &cancel,
    )
    .block_on()
    .unwrap();

    assert_eq!(remote.batch_requests.load(Ordering::SeqCst), 1);
    assert_eq!(remote.object_gets.load(Ordering::SeqCst), 4);
    assert_eq!(stats.closure_objects, 4);
    for hash in graph.all_hashes() {
        assert!(store.has(&hash).unwrap());
    }
}

#[test]
fn test_fetch_reaches_remote_closure() {
    let (_server_temp, source) = new_temp_store();
    let graph = write_sample_graph(&source, "alpha");
    let other = write_sample_graph(&source, "other");
    let remote = InMemoryRemote::new();
    remote.add_store(&source, &graph.all_hashes());
    remote.add_store(&source, &other.all_hashes());

    let (_temp, store) = new_temp_store();
    let cancel = CancellationToken::new();
    fetch_into_store(
        &remote,
        &store,
        &[graph.commit],
        &[],
        &FetchOptions::default(),
        &cancel,
    )
    .block_on()
    .unwrap();

    // The local closure under the want equals the remote's.
    let local = reachable_set(&store, &[graph.commit]).unwrap();
    assert_eq!(local, remote.reachable(&[graph.commit]));
    // Unrelated remote objects did not come along.
    assert!(!store.has(&other.commit).unwrap());
}

#[test]
fn test_fetch_stops_when_truncated_batch_brings_nothing_new() {
    let (_server_temp, source) = new_temp_store();
    let (commit, tree, blob) = three_object_chain(&source);
    let remote = InMemoryRemote::new();
    remote.add_store(&source, &[commit, tree, blob]);

    let everything = vec![
        remote.record_for(&commit).unwrap(),
        remote.record_for(&tree).unwrap(),
        remote.record_for(&blob).unwrap(),
    ];
    // A confused server that claims truncation while resending the same
    // objects; the client must not spin.
    remote.script_batch(batch(everything.clone(), true));
    remote.script_batch(batch(everything.clone(), true));
    remote.script_batch(batch(everything, true));

    let (_temp, store) = new_temp_store();
    let cancel = CancellationToken::new();
    fetch_into_store(
        &remote,
        &store,
        &[commit],
        &[],
        &FetchOptions::default(),
        &cancel,
    )
    .block_on()
    .unwrap();

    assert_eq!(remote.batch_requests.load(Ordering::SeqCst), 2);
    assert!(store.has(&blob).unwrap());
}

#[test]
fn test_fetch_negotiation_limit_exceeded() {
    let remote = InMemoryRemote::new();
    // Every round brings something new and claims more is coming.
    for i in 0..3u8 {
        let data = vec![i];
        let record = ObjectRecord {
            hash: hash_object(ObjectType::Blob, &data),
            object_type: ObjectType::Blob,
            data,
        };
        remote.script_batch(batch(vec![record], true));
    }

    let (_temp, store) = new_temp_store();
    let cancel = CancellationToken::new();
    let options = FetchOptions {
        max_negotiation_rounds: 3,
        ..FetchOptions::default()
    };
    let err = fetch_into_store(
        &remote,
        &store,
        &[hash_object(ObjectType::Blob, b"anything")],
        &[],
        &options,
        &cancel,
    )
    .block_on()
    .unwrap_err();
    assert_matches!(err, GotError::NegotiationLimitExceeded { rounds: 3 });
}

#[test]
fn test_fetch_rejects_tampered_record() {
    let remote = InMemoryRemote::new();
    let claimed = hash_object(ObjectType::Blob, b"the real content");
    remote.script_batch(batch(
        vec![ObjectRecord {
            hash: claimed,
            object_type: ObjectType::Blob,
            data: b"something else".to_vec(),
        }],
        false,
    ));

    let (_temp, store) = new_temp_store();
    let cancel = CancellationToken::new();
    let err = fetch_into_store(
        &remote,
        &store,
        &[claimed],
        &[],
        &FetchOptions::default(),
        &cancel,
    )
    .block_on()
    .unwrap_err();
    assert_matches!(err, GotError::Corrupt { .. });
    // The bad record never reached the store.
    assert!(!store.has(&claimed).unwrap());
}

#[test]
fn test_fetch_sends_recent_haves_window() {
    let (_server_temp, source) = new_temp_store();
    let (commit, tree, blob) = three_object_chain(&source);
    let remote = InMemoryRemote::new();
    remote.add_store(&source, &[commit, tree, blob]);
    remote.script_batch(batch(vec![remote.record_for(&commit).unwrap()], false));

    let haves: Vec<ObjectHash> = (0..5u8)
        .map(|i| hash_object(ObjectType::Blob, &[i]))
        .collect();
    let (_temp, store) = new_temp_store();
    // Make the closure pass succeed without GETs.
    store.write(ObjectType::Tree, &source.read(&tree).unwrap().1).unwrap();
    store.write(ObjectType::Blob, &source.read(&blob).unwrap().1).unwrap();

    let cancel = CancellationToken::new();
    let options = FetchOptions {
        max_batch_have_hashes: 2,
        ..FetchOptions::default()
    };
    fetch_into_store(&remote, &store, &[commit], &haves, &options, &cancel)
        .block_on()
        .unwrap();

    let requests = remote.batch_requests_seen();
    assert_eq!(requests.len(), 1);
    // Only the most recent slice of the known set travels.
    assert_eq!(requests[0].haves, Some(haves[3..].to_vec()));
}

#[test]
fn test_fetch_honors_cancellation() {
    let remote = InMemoryRemote::new();
    let (_temp, store) = new_temp_store();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = fetch_into_store(
        &remote,
        &store,
        &[hash_object(ObjectType::Blob, b"x")],
        &[],
        &FetchOptions::default(),
        &cancel,
    )
    .block_on()
    .unwrap_err();
    assert_matches!(err, GotError::Cancelled);
    assert_eq!(remote.batch_requests.load(Ordering::SeqCst), 0);
}

#[test]
fn test_push_collection_is_bounded_by_stop_roots() {
    let (_temp, store) = new_temp_store();
    let old = write_sample_graph(&store, "old");
    let new = write_sample_graph(&store, "new");
    let tip = commit_value(
        store.read_commit(&new.commit).unwrap().tree_hash,
        vec![old.commit],
        "tip",
    );
    let tip_hash = store
        .write(ObjectType::Commit, &codec::encode_commit(&tip).unwrap())
        .unwrap();

    let records = collect_objects_for_push(&store, &[tip_hash], &[old.commit]).unwrap();
    let pushed: HashSet<ObjectHash> = records.iter().map(|record| record.hash).collect();

    // Nothing the remote already knows travels again.
    let stop_set = reachable_set(&store, &[old.commit]).unwrap();
    assert!(pushed.is_disjoint(&stop_set));
    // The new subgraph does: the tip and the tree it snapshots.
    assert!(pushed.contains(&tip_hash));
    for hash in [new.tree, new.blob, new.entity_list, new.entity] {
        assert!(pushed.contains(&hash), "{hash} missing from push set");
    }
}

#[test]
fn test_push_requires_local_wants() {
    let (_temp, store) = new_temp_store();
    let missing = hash_object(ObjectType::Blob, b"never written");
    assert_matches!(
        collect_objects_for_push(&store, &[missing], &[]),
        Err(GotError::NotFound { .. })
    );
}

#[test]
fn test_push_to_remote_chunks_and_delivers() {
    let (_temp, store) = new_temp_store();
    let graph = write_sample_graph(&store, "alpha");
    let remote = InMemoryRemote::new();

    let cancel = CancellationToken::new();
    let options = PushOptions {
        max_chunk_records: 2,
        ..PushOptions::default()
    };
    let stats = push_to_remote(&remote, &store, &[graph.commit], &[], &options, &cancel)
        .block_on()
        .unwrap();

    assert_eq!(stats.records, graph.all_hashes().len());
    assert_eq!(stats.chunks, 3);
    assert_eq!(remote.pushed_records().len(), stats.records);
    // The remote now holds the full closure.
    assert_eq!(
        remote.reachable(&[graph.commit]),
        reachable_set(&store, &[graph.commit]).unwrap()
    );
}

#[test]
fn test_push_second_time_sends_nothing() {
    let (_temp, store) = new_temp_store();
    let graph = write_sample_graph(&store, "alpha");
    let remote = InMemoryRemote::new();
    let cancel = CancellationToken::new();
    let options = PushOptions::default();

    push_to_remote(&remote, &store, &[graph.commit], &[], &options, &cancel)
        .block_on()
        .unwrap();
    // With the previous tip as a stop root, the second push is empty.
    let stats = push_to_remote(
        &remote,
        &store,
        &[graph.commit],
        &[graph.commit],
        &options,
        &cancel,
    )
    .block_on()
    .unwrap();
    assert_eq!(stats.records, 0);
    assert_eq!(stats.chunks, 0);
}
