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

//! Correlation id allocation for multiplexed exchanges.

use std::sync::atomic::{AtomicU64, Ordering};

/// Allocates unique ids for requests and streams on one connection.
///
/// Ids start at 1 and increment monotonically; id 0 is reserved for
/// non-correlated frames (cancel-all). Allocation is lock-free, so ids can be
/// drawn from any task without contention. An id is never reused while its
/// exchange is pending: the `u64` space does not wrap in practice.
///
/// # Example
///
/// ```rust
/// use botstream::session::CorrelationIdGenerator;
///
/// let ids = CorrelationIdGenerator::new();
/// let a = ids.next();
/// let b = ids.next();
/// assert!(a > 0);
/// assert_ne!(a, b);
/// ```
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    next_id: AtomicU64,
}

impl CorrelationIdGenerator {
    /// Creates a generator starting at id 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocates the next id.
    #[must_use]
    pub fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for CorrelationIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_at_one_and_increments() {
        let ids = CorrelationIdGenerator::new();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
        assert_eq!(ids.next(), 3);
    }

    #[tokio::test]
    async fn test_unique_under_contention() {
        let ids = Arc::new(CorrelationIdGenerator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ids = Arc::clone(&ids);
            handles.push(tokio::spawn(async move {
                (0..250).map(|_| ids.next()).collect::<Vec<_>>()
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 2000);
    }
}
