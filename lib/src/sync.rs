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

//! Moving closed subgraphs between peers.
//!
//! Fetch negotiates with batch requests carrying `wants` and a window of
//! known hashes, then always finishes with a graph-closure pass that fills
//! any hole with a point GET, so a successful fetch leaves the subgraph
//! under `wants` complete. Push collects the objects reachable from local
//! tips but not from the remote-known stop roots.
//!
//! Every object coming off the wire is re-hashed before it is written;
//! a record whose content does not match its claimed hash is discarded and
//! the operation fails.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::client::RemoteClient;
use crate::client::check_cancelled;
use crate::error::GotError;
use crate::error::GotResult;
use crate::graph::reachable_set;
use crate::graph::referenced;
use crate::hash::hash_object;
use crate::object_id::ObjectHash;
use crate::protocol::BatchObjectsRequest;
use crate::protocol::ObjectRecord;
use crate::store::Store;

/// Hard ceiling on the configurable negotiation round cap.
pub const MAX_NEGOTIATION_ROUNDS_LIMIT: u32 = 1_000_000;

/// Fetch tunables.
#[derive(Clone, Debug)]
pub struct FetchOptions {
    /// Negotiation rounds before giving up. Must be within
    /// `1..=`[`MAX_NEGOTIATION_ROUNDS_LIMIT`].
    pub max_negotiation_rounds: u32,
    /// Cap passed to the server per batch request.
    pub max_batch_objects: u32,
    /// How many of the most recent known hashes each request carries.
    pub max_batch_have_hashes: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_negotiation_rounds: 1024,
            max_batch_objects: 50_000,
            max_batch_have_hashes: 20_000,
        }
    }
}

/// What a fetch did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchStats {
    /// Batch requests sent.
    pub rounds: u32,
    /// New objects written from batch responses.
    pub batch_objects: usize,
    /// New objects written by the closure pass.
    pub closure_objects: usize,
}

/// Push tunables: how collected records are split for transport.
#[derive(Clone, Debug)]
pub struct PushOptions {
    pub max_chunk_records: usize,
    pub max_chunk_bytes: usize,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            max_chunk_records: 1000,
            max_chunk_bytes: 8 << 20,
        }
    }
}

/// What a push sent.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PushStats {
    pub records: usize,
    pub bytes: usize,
    pub chunks: usize,
}

fn verify_record(record: &ObjectRecord) -> GotResult<()> {
    let computed = hash_object(record.object_type, &record.data);
    if computed != record.hash {
        return Err(GotError::corrupt(
            format!("object record {}", record.hash),
            format!("content hashes to {computed}"),
        ));
    }
    Ok(())
}

/// Fetches the subgraphs under `wants` into the store.
///
/// `haves` seeds the known set so the server can skip what this side
/// already holds. The cancellation token is honored between rounds and
/// before every point GET.
#[tracing::instrument(skip_all, fields(wants = wants.len(), haves = haves.len()))]
pub async fn fetch_into_store(
    client: &dyn RemoteClient,
    store: &Store,
    wants: &[ObjectHash],
    haves: &[ObjectHash],
    options: &FetchOptions,
    cancel: &CancellationToken,
) -> GotResult<FetchStats> {
    if options.max_negotiation_rounds == 0
        || options.max_negotiation_rounds > MAX_NEGOTIATION_ROUNDS_LIMIT
    {
        return Err(GotError::InvalidInput(format!(
            "max negotiation rounds must be within 1..={MAX_NEGOTIATION_ROUNDS_LIMIT}"
        )));
    }
    let mut seen_wants = HashSet::new();
    let wants: Vec<ObjectHash> = wants
        .iter()
        .copied()
        .filter(|hash| seen_wants.insert(*hash))
        .collect();

    let mut stats = FetchStats::default();
    let mut known: HashSet<ObjectHash> = HashSet::new();
    let mut known_order: Vec<ObjectHash> = Vec::new();
    for hash in haves {
        if known.insert(*hash) {
            known_order.push(*hash);
        }
    }

    if !wants.is_empty() {
        let mut converged = false;
        for round in 1..=options.max_negotiation_rounds {
            check_cancelled(cancel)?;
            let window_start = known_order
                .len()
                .saturating_sub(options.max_batch_have_hashes);
            let request = BatchObjectsRequest {
                wants: wants.clone(),
                haves: (!known_order.is_empty()).then(|| known_order[window_start..].to_vec()),
                max_objects: Some(options.max_batch_objects),
            };
            let response = client.batch_objects(&request, cancel).await?;
            stats.rounds = round;

            let mut round_new = 0usize;
            for record in &response.objects {
                verify_record(record)?;
                if !store.has(&record.hash)? {
                    store.write(record.object_type, &record.data)?;
                    round_new += 1;
                    stats.batch_objects += 1;
                }
                if known.insert(record.hash) {
                    known_order.push(record.hash);
                }
            }

            if !response.truncated {
                converged = true;
                break;
            }
            if round_new == 0 {
                // The server keeps resending objects we already hold; more
                // rounds would spin without progress.
                tracing::debug!(round, "truncated batch brought nothing new");
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(GotError::NegotiationLimitExceeded {
                rounds: options.max_negotiation_rounds,
            });
        }
    }

    // Closure pass: whatever batching left out is fetched point-wise, so
    // the subgraph under `wants` is complete regardless of truncation.
    let mut visited: HashSet<ObjectHash> = HashSet::new();
    let mut stack = wants;
    while let Some(hash) = stack.pop() {
        if !visited.insert(hash) {
            continue;
        }
        let (object_type, content) = if store.has(&hash)? {
            store.read(&hash)?
        } else {
            check_cancelled(cancel)?;
            let record = client.get_object(&hash, cancel).await?;
            if record.hash != hash {
                return Err(GotError::corrupt(
                    format!("object record {hash}"),
                    format!("remote answered with {}", record.hash),
                ));
            }
            verify_record(&record)?;
            store.write(record.object_type, &record.data)?;
            stats.closure_objects += 1;
            (record.object_type, record.data)
        };
        for child in referenced(object_type, &content)? {
            if !visited.contains(&child) {
                stack.push(child);
            }
        }
    }

    tracing::debug!(
        rounds = stats.rounds,
        batch = stats.batch_objects,
        closure = stats.closure_objects,
        "fetch finished"
    );
    Ok(stats)
}

/// Collects the objects to push: everything reachable from `wants` minus
/// everything reachable from `stop_roots`. The wants themselves must be
/// present locally.
pub fn collect_objects_for_push(
    store: &Store,
    wants: &[ObjectHash],
    stop_roots: &[ObjectHash],
) -> GotResult<Vec<ObjectRecord>> {
    for want in wants {
        if !store.has(want)? {
            return Err(GotError::NotFound { hash: want.hex() });
        }
    }
    let stop_set = reachable_set(store, stop_roots)?;

    let mut records = Vec::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<ObjectHash> = wants.iter().rev().copied().collect();
    while let Some(hash) = stack.pop() {
        if !visited.insert(hash) || stop_set.contains(&hash) {
            continue;
        }
        if !store.has(&hash)? {
            // The local graph may be shallow past the stop frontier.
            continue;
        }
        let (object_type, data) = store.read(&hash)?;
        for child in referenced(object_type, &data)?.into_iter().rev() {
            if !visited.contains(&child) {
                stack.push(child);
            }
        }
        records.push(ObjectRecord {
            hash,
            object_type,
            data,
        });
    }
    Ok(records)
}

/// Splits records into transport chunks bounded by record count and payload
/// bytes. A single oversized record still travels, alone in its chunk.
pub fn chunk_records(records: Vec<ObjectRecord>, options: &PushOptions) -> Vec<Vec<ObjectRecord>> {
    let mut chunks = Vec::new();
    let mut current: Vec<ObjectRecord> = Vec::new();
    let mut current_bytes = 0usize;
    for record in records {
        let record_bytes = record.data.len();
        let over_count = current.len() >= options.max_chunk_records.max(1);
        let over_bytes = !current.is_empty() && current_bytes + record_bytes > options.max_chunk_bytes;
        if over_count || over_bytes {
            chunks.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_bytes += record_bytes;
        current.push(record);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Collects, chunks, and sends everything the remote is missing.
#[tracing::instrument(skip_all, fields(wants = wants.len(), stop_roots = stop_roots.len()))]
pub async fn push_to_remote(
    client: &dyn RemoteClient,
    store: &Store,
    wants: &[ObjectHash],
    stop_roots: &[ObjectHash],
    options: &PushOptions,
    cancel: &CancellationToken,
) -> GotResult<PushStats> {
    let records = collect_objects_for_push(store, wants, stop_roots)?;
    let mut stats = PushStats {
        records: records.len(),
        bytes: records.iter().map(|record| record.data.len()).sum(),
        chunks: 0,
    };
    for chunk in chunk_records(records, options) {
        check_cancelled(cancel)?;
        client.push_objects(&chunk, cancel).await?;
        stats.chunks += 1;
    }
    tracing::debug!(
        records = stats.records,
        bytes = stats.bytes,
        chunks = stats.chunks,
        "push finished"
    );
    Ok(stats)
}
