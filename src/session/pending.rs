//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Tracking of in-flight requests awaiting responses.

use crate::payloads::ReceiveResponse;
use std::collections::HashMap;
use tokio::sync::{oneshot, Mutex};

/// Maps correlation ids to the callers awaiting their responses.
///
/// This is the only concurrently mutated structure in the session:
/// registrations come from arbitrary caller tasks while completions come
/// from the single listen loop, so the map lives behind a mutex.
///
/// Each id is retired exactly once. Completing an id that is unknown (never
/// registered, already completed, or cancelled) returns `false` and is
/// otherwise a no-op, which is what makes duplicate or late response frames
/// harmless.
#[derive(Debug, Default)]
pub struct PendingResponses {
    entries: Mutex<HashMap<u64, oneshot::Sender<ReceiveResponse>>>,
}

impl PendingResponses {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending request and returns the receiver its response
    /// will arrive on.
    ///
    /// Dropping the tracker side of the channel (via [`clear`](Self::clear))
    /// fails the receiver, which callers surface as a disconnect error.
    pub async fn register(&self, correlation_id: u64) -> oneshot::Receiver<ReceiveResponse> {
        let (tx, rx) = oneshot::channel();
        self.entries.lock().await.insert(correlation_id, tx);
        rx
    }

    /// Completes a pending request.
    ///
    /// Returns `true` if a caller was waiting on `correlation_id`, `false`
    /// if the id is unknown or already retired.
    pub async fn complete(&self, correlation_id: u64, response: ReceiveResponse) -> bool {
        match self.entries.lock().await.remove(&correlation_id) {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Removes a pending request without completing it (caller cancelled or
    /// timed out).
    ///
    /// Returns `true` if the id was pending.
    pub async fn cancel(&self, correlation_id: u64) -> bool {
        self.entries.lock().await.remove(&correlation_id).is_some()
    }

    /// Drops every pending entry; each waiting caller observes a closed
    /// channel.
    ///
    /// Called on connection teardown so all in-flight `send_request` calls
    /// fail promptly instead of waiting out their timeouts.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Number of in-flight requests.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns `true` if no requests are in flight.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
