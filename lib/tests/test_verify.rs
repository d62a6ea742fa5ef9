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

use std::fs;

use assert_matches::assert_matches;
use got_lib::error::GotError;
use got_lib::gc::pack_loose_objects;
use got_lib::verify::verify;
use testutils::new_temp_store;
use testutils::write_sample_graph;

#[test]
fn test_verify_healthy_store() {
    let (_temp, store) = new_temp_store();
    let graph = write_sample_graph(&store, "alpha");
    write_sample_graph(&store, "beta");
    pack_loose_objects(&store, false).unwrap();
    // Half packed with loose copies remaining, plus a fresh loose graph.
    write_sample_graph(&store, "gamma");

    let stats = verify(&store).unwrap();
    assert!(stats.loose_objects >= graph.all_hashes().len());
    assert_eq!(stats.packs, 1);
    assert!(stats.packed_entries > 0);
}

#[test]
fn test_verify_reports_overwritten_loose_object() {
    let (_temp, store) = new_temp_store();
    let graph = write_sample_graph(&store, "alpha");
    let hex = graph.blob.hex();
    let path = store.path().join(&hex[..2]).join(&hex[2..]);
    fs::write(&path, b"broken").unwrap();

    let err = verify(&store).unwrap_err();
    assert_matches!(err, GotError::Corrupt { .. });
    // The report names the offending file.
    assert!(err.to_string().contains(&hex[2..]));
}

#[test]
fn test_verify_reports_wrong_content_under_right_envelope() {
    let (_temp, store) = new_temp_store();
    let graph = write_sample_graph(&store, "alpha");
    let hex = graph.blob.hex();
    let path = store.path().join(&hex[..2]).join(&hex[2..]);
    // A well-formed envelope whose hash does not match the filename.
    fs::write(&path, b"blob 5\0wrong").unwrap();

    let err = verify(&store).unwrap_err();
    assert_matches!(
        err,
        GotError::Corrupt { reason, .. } if reason.contains(&hex)
    );
}

#[test]
fn test_verify_rejects_pack_bit_flip() {
    let (_temp, store) = new_temp_store();
    write_sample_graph(&store, "alpha");
    let stats = pack_loose_objects(&store, true).unwrap();
    let pack_path = stats.pack_path.unwrap();

    let mut bytes = fs::read(&pack_path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x01;
    fs::write(&pack_path, &bytes).unwrap();

    assert!(verify(&store).is_err());
}

#[test]
fn test_verify_rejects_index_bit_flip() {
    let (_temp, store) = new_temp_store();
    write_sample_graph(&store, "alpha");
    let stats = pack_loose_objects(&store, true).unwrap();
    let idx_path = stats.pack_path.unwrap().with_extension("idx");

    let mut bytes = fs::read(&idx_path).unwrap();
    bytes[40] ^= 0x10;
    fs::write(&idx_path, &bytes).unwrap();

    assert_matches!(verify(&store), Err(GotError::Corrupt { .. }));
}

#[test]
fn test_verify_rejects_missing_pack_file() {
    let (_temp, store) = new_temp_store();
    write_sample_graph(&store, "alpha");
    let stats = pack_loose_objects(&store, true).unwrap();
    fs::remove_file(stats.pack_path.unwrap()).unwrap();

    assert_matches!(
        verify(&store),
        Err(GotError::Corrupt { reason, .. }) if reason.contains("missing")
    );
}
