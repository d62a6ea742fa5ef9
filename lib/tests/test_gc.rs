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

use got_lib::gc::pack_loose_objects;
use got_lib::gc::pack_reachable;
use got_lib::object::ObjectType;
use got_lib::verify::verify;
use testutils::new_temp_store;
use testutils::write_sample_graph;

#[test]
fn test_gc_is_idempotent() {
    let (_temp, store) = new_temp_store();
    let graph = write_sample_graph(&store, "alpha");

    let first = pack_loose_objects(&store, false).unwrap();
    assert_eq!(first.packed, graph.all_hashes().len());

    // A second run finds nothing new and writes nothing.
    let second = pack_loose_objects(&store, false).unwrap();
    assert_eq!(second.packed, 0);
    assert_eq!(second.pack_path, None);

    for hash in graph.all_hashes() {
        assert!(store.has(&hash).unwrap());
    }
    verify(&store).unwrap();
}

#[test]
fn test_gc_names_pack_by_checksum() {
    let (_temp, store) = new_temp_store();
    write_sample_graph(&store, "beta");
    let stats = pack_loose_objects(&store, false).unwrap();
    let pack_path = stats.pack_path.unwrap();
    let name = pack_path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("pack-") && name.ends_with(".pack"));
    // The paired index landed next to it.
    assert!(pack_path.with_extension("idx").is_file());
}

#[test]
fn test_gc_prune_removes_loose_copies() {
    let (_temp, store) = new_temp_store();
    let graph = write_sample_graph(&store, "gamma");
    let stats = pack_loose_objects(&store, true).unwrap();
    assert_eq!(stats.pruned, graph.all_hashes().len());
    assert_eq!(store.loose_hashes().unwrap(), vec![]);
    verify(&store).unwrap();
}

#[test]
fn test_gc_skips_objects_already_packed() {
    let (_temp, store) = new_temp_store();
    write_sample_graph(&store, "delta");
    pack_loose_objects(&store, false).unwrap();

    // The loose copies are still around; another run must not repack them,
    // only pick up the new object.
    let extra = store.write(ObjectType::Blob, b"late arrival").unwrap();
    let stats = pack_loose_objects(&store, false).unwrap();
    assert_eq!(stats.packed, 1);
    assert!(store.has(&extra).unwrap());
    verify(&store).unwrap();
}

#[test]
fn test_reachable_gc_drops_unreachable_loose() {
    let (_temp, store) = new_temp_store();
    let kept = write_sample_graph(&store, "kept");
    let orphan = store.write(ObjectType::Blob, b"orphaned data").unwrap();

    let stats = pack_reachable(&store, &[kept.commit], true).unwrap();
    assert_eq!(stats.packed, kept.all_hashes().len());

    for hash in kept.all_hashes() {
        assert!(store.has(&hash).unwrap());
    }
    assert!(!store.has(&orphan).unwrap());
    assert_eq!(store.loose_hashes().unwrap(), vec![]);
    verify(&store).unwrap();
}

#[test]
fn test_reachable_gc_without_prune_keeps_orphans() {
    let (_temp, store) = new_temp_store();
    let kept = write_sample_graph(&store, "kept");
    let orphan = store.write(ObjectType::Blob, b"orphaned data").unwrap();

    pack_reachable(&store, &[kept.commit], false).unwrap();
    assert!(store.has(&orphan).unwrap());
    verify(&store).unwrap();
}
