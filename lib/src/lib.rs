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

#![warn(missing_docs)]

//! The core engine of Got, a structural, content-addressed version control
//! system.
//!
//! The crate covers the object model and its canonical byte formats, the
//! loose + packed object store, the pack and index codecs with delta
//! resolution, garbage collection and verification, graph reachability, and
//! synchronization with a remote peer over HTTP. The CLI, the working-tree
//! staging area, and the language-level entity extractor live elsewhere and
//! talk to this crate through the store, ref, and client surfaces.

pub mod client;
pub mod codec;
pub mod error;
pub mod file_util;
pub mod gc;
pub mod graph;
pub mod hash;
pub mod hex_util;
pub mod object;
pub mod object_id;
pub mod pack;
pub mod protocol;
pub mod refs;
pub mod repo;
pub mod sideband;
pub mod store;
pub mod sync;
pub mod verify;
