//! Lazy result retrieval for one query cycle.

use super::{RequestCoordinator, StreamPull, timeout_sentinel};

use serde_json::Value;
use tokio::time::Instant;

/// Finite, non-restartable sequence of result content for one query.
///
/// Yields queued items oldest-first while the query is in flight or items
/// remain. When the deadline expires first, the cycle is abandoned, one
/// timeout sentinel is yielded, and the stream ends.
pub struct ResultStream {
    coordinator: RequestCoordinator,
    deadline: Instant,
    done: bool,
}

impl ResultStream {
    pub(crate) fn new(coordinator: RequestCoordinator, deadline: Instant) -> Self {
        Self {
            coordinator,
            deadline,
            done: false,
        }
    }

    /// Next result content, or `None` once the cycle has fully drained.
    pub async fn next(&mut self) -> Option<Value> {
        if self.done {
            return None;
        }

        match self.coordinator.next_queued(self.deadline).await {
            StreamPull::Item(item) => Some(item),
            StreamPull::Finished => {
                self.done = true;
                None
            }
            StreamPull::TimedOut => {
                self.done = true;
                Some(timeout_sentinel())
            }
        }
    }

    /// Drain the remaining sequence into a vector.
    pub async fn collect(mut self) -> Vec<Value> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item);
        }
        items
    }
}
