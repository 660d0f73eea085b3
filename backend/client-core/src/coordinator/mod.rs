//! Single-in-flight query coordination.
//!
//! Exactly one query may await completion at a time. The state here is
//! shared between the caller's task (submit, pull) and the transport's
//! receive loop (event delivery); every access goes through one mutex and
//! pullers block on a [`Notify`] signaled by each mutation — there is no
//! unguarded shared memory and no polling loop.
//!
//! Timeouts and empty results surface as sentinel result values, not errors,
//! so a failed query leaves the session usable.

pub mod stream;

pub use stream::ResultStream;

use crate::error::query::QueryError;
use crate::frame::{IncomingEvent, SequenceCounter};

use common::ErrorLocation;

use std::collections::VecDeque;
use std::panic::Location;
use std::sync::Arc;

use log::{debug, trace};
use serde_json::{Value, json};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// Sentinel returned when no completion arrived within the timeout.
pub fn timeout_sentinel() -> Value {
    json!({ "error": "timeout" })
}

/// Sentinel returned when a cycle completed without any queued content.
pub fn no_result_sentinel() -> Value {
    json!({ "error": "no_result" })
}

/// State of the current query cycle.
///
/// `last_completed_uuid` survives across cycles: it is what suppresses a
/// stale acknowledgment for an already-completed query from leaking into the
/// next cycle's results.
struct CycleState {
    in_flight: bool,
    queue: VecDeque<Value>,
    last_completed_uuid: Option<String>,
}

struct CoordinatorInner {
    cycle: Mutex<CycleState>,
    counter: Mutex<SequenceCounter>,
    notify: Notify,
}

/// Coordinates query submission with event arrival.
///
/// Cloneable; all clones share the same underlying state, so one clone lives
/// with the transport's receive loop and another with the caller.
#[derive(Clone)]
pub struct RequestCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl RequestCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                cycle: Mutex::new(CycleState {
                    in_flight: false,
                    queue: VecDeque::new(),
                    last_completed_uuid: None,
                }),
                counter: Mutex::new(SequenceCounter::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Open a new query cycle and return its envelope prefix.
    ///
    /// Clears any leftover queue from the previous cycle and advances the
    /// sequence counter. `last_completed_uuid` is carried over.
    ///
    /// # Errors
    ///
    /// [`QueryError::ConcurrentRequest`] when a query is already in flight.
    pub async fn submit(&self) -> Result<u64, QueryError> {
        let mut cycle = self.inner.cycle.lock().await;
        if cycle.in_flight {
            return Err(QueryError::ConcurrentRequest {
                location: ErrorLocation::from(Location::caller()),
            });
        }

        cycle.queue.clear();
        cycle.in_flight = true;

        let prefix = self.inner.counter.lock().await.advance();
        trace!("query cycle opened with envelope prefix {prefix}");
        Ok(prefix)
    }

    /// Whether a query currently awaits completion.
    pub async fn in_flight(&self) -> bool {
        self.inner.cycle.lock().await.in_flight
    }

    /// Abandon the in-flight query, if any, and wake all pullers.
    ///
    /// Used on timeout expiry and on send failure after submit. The
    /// abandoned request is not cancelled server-side; late frames for it
    /// are dropped by [`on_event`](Self::on_event)'s idle check, so they
    /// cannot leak into the next cycle.
    pub async fn force_idle(&self) {
        let mut cycle = self.inner.cycle.lock().await;
        if cycle.in_flight {
            cycle.in_flight = false;
            debug!("query cycle abandoned");
            self.inner.notify.notify_waiters();
        }
    }

    /// Deliver one decoded event from the transport.
    ///
    /// Returns `false` when the event was dropped: no query in flight, a
    /// duplicate acknowledgment, or a keepalive (which must never get here
    /// in the first place).
    pub async fn on_event(&self, event: IncomingEvent) -> bool {
        let mut cycle = self.inner.cycle.lock().await;
        if !cycle.in_flight {
            debug!("dropping event with no query in flight");
            return false;
        }

        match event {
            IncomingEvent::Keepalive => return false,
            IncomingEvent::Partial { content } => {
                cycle.queue.push_back(content);
            }
            IncomingEvent::Final { content, uuid } => {
                cycle.queue.push_back(content);
                cycle.last_completed_uuid = uuid;
                cycle.in_flight = false;
            }
            IncomingEvent::Ack { payload, uuid } => {
                let duplicate = match (&uuid, &cycle.last_completed_uuid) {
                    (Some(current), Some(last)) => current == last,
                    _ => false,
                };
                if duplicate {
                    trace!("suppressing acknowledgment for already-completed query");
                    return false;
                }
                // An ack is itself a terminal signal.
                cycle.queue.push_back(payload);
                cycle.in_flight = false;
            }
        }

        self.inner.notify.notify_waiters();
        true
    }

    /// Block until the cycle completes and return the most recent item.
    ///
    /// On deadline expiry the cycle is abandoned and the timeout sentinel
    /// returned; a completed cycle with an empty queue yields the no-result
    /// sentinel. Items older than the returned one stay queued until the
    /// next submit clears them.
    pub async fn pull_sync(&self, deadline: Instant) -> Value {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut cycle = self.inner.cycle.lock().await;
                if !cycle.in_flight {
                    return cycle.queue.pop_back().unwrap_or_else(no_result_sentinel);
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    self.force_idle().await;
                    return timeout_sentinel();
                }
            }
        }
    }

    /// Stream queued items oldest-first until the cycle ends.
    pub fn pull_streaming(&self, deadline: Instant) -> ResultStream {
        ResultStream::new(self.clone(), deadline)
    }

    /// Pop the oldest queued item, waiting for one while the cycle runs.
    pub(crate) async fn next_queued(&self, deadline: Instant) -> StreamPull {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut cycle = self.inner.cycle.lock().await;
                if let Some(item) = cycle.queue.pop_front() {
                    return StreamPull::Item(item);
                }
                if !cycle.in_flight {
                    return StreamPull::Finished;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    self.force_idle().await;
                    return StreamPull::TimedOut;
                }
            }
        }
    }
}

impl Default for RequestCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one streaming pull.
pub(crate) enum StreamPull {
    Item(Value),
    Finished,
    TimedOut,
}
