//! Per-group queue draining

use super::limiter::{GroupState, LimiterInner, TokenBucketLimiter};
use crate::core::events::DispatchEvent;
use crate::utils::error::DispatchError;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

impl TokenBucketLimiter {
    /// Start the group's drain loop unless one is already running
    ///
    /// Must be called with the group's lock held, which is also where the loop
    /// decides to stop, so a queued caller is never left without a loop.
    pub(super) fn ensure_drain_task(
        &self,
        group: &str,
        state: &mut GroupState,
        handle: &Arc<Mutex<GroupState>>,
    ) {
        if state.drain_task.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        debug!(group, "starting drain loop");
        state.drain_task = Some(tokio::spawn(drain_loop(
            Arc::clone(&self.inner),
            group.to_string(),
            Arc::clone(handle),
        )));
    }
}

async fn drain_loop(inner: Arc<LimiterInner>, group: String, handle: Arc<Mutex<GroupState>>) {
    let tick = inner.settings.drain_interval();
    let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let mut state = handle.lock().await;
        if inner.is_shut_down() {
            break;
        }

        inner.drain_once(&group, &mut state).await;
        if state.queue.is_empty() {
            state.drain_task = None;
            debug!(group = %group, "queue empty, stopping drain loop");
            break;
        }
    }
}

impl LimiterInner {
    /// One tick: drop expired callers, refill, then admit in FIFO order
    pub(super) async fn drain_once(&self, group: &str, state: &mut GroupState) {
        let now = Instant::now();
        self.purge_expired(group, state, now);
        if state.queue.is_empty() {
            return;
        }

        if let Err(e) = self.backend.refill_tokens(group, &state.config).await {
            warn!(group, "refill failed, retrying next tick: {}", e);
            return;
        }

        while let Some(front) = state.queue.front() {
            if front.admit.is_closed() {
                state.queue.pop_front();
                continue;
            }

            match self.backend.consume_tokens(group, &state.config, 1.0).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!(group, "consume failed, retrying next tick: {}", e);
                    break;
                }
            }

            let Some(caller) = state.queue.pop_front() else {
                break;
            };
            let waited = now.saturating_duration_since(caller.enqueued_at);
            if caller.admit.send(Ok(())).is_ok() {
                self.events.record(DispatchEvent::Admitted {
                    group: group.to_string(),
                    waited,
                });
            }
        }
    }

    /// Reject callers whose deadline has passed and forget cancelled ones
    fn purge_expired(&self, group: &str, state: &mut GroupState, now: Instant) {
        if state
            .queue
            .iter()
            .all(|caller| caller.deadline > now && !caller.admit.is_closed())
        {
            return;
        }

        let retry_after = Duration::try_from_secs_f64(state.config.permit_interval_secs())
            .unwrap_or(Duration::MAX);
        let mut kept = VecDeque::with_capacity(state.queue.len());
        for caller in state.queue.drain(..) {
            if caller.admit.is_closed() {
                continue;
            }
            if caller.deadline > now {
                kept.push_back(caller);
                continue;
            }

            let waited = now.saturating_duration_since(caller.enqueued_at);
            let _ = caller
                .admit
                .send(Err(DispatchError::queue_timeout(group, waited, retry_after)));
            self.events.record(DispatchEvent::QueueTimeout {
                group: group.to_string(),
                waited,
            });
        }
        state.queue = kept;
    }
}
