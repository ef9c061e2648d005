//! Core rate limiter implementation

use super::backend::{LocalTokenBackend, TokenBackend};
use super::registry::RateLimitRegistry;
use super::types::{GroupMetrics, LimiterMetrics, RateLimitConfig};
use crate::config::{LimiterConfig, Validate};
use crate::core::events::{DispatchEvent, EventSink, TracingEventSink};
use crate::utils::error::{DispatchError, Result};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A caller waiting for a permit
pub(super) struct QueuedCaller {
    /// Resolved exactly once: admitted, timed out or shut down
    pub(super) admit: oneshot::Sender<Result<()>>,
    pub(super) enqueued_at: Instant,
    pub(super) deadline: Instant,
}

/// Mutable state of one group, guarded by that group's lock
pub(super) struct GroupState {
    pub(super) config: RateLimitConfig,
    /// Set once the server has reported limits; registry values stop applying
    pub(super) adapted: bool,
    pub(super) queue: VecDeque<QueuedCaller>,
    pub(super) drain_task: Option<JoinHandle<()>>,
    pub(super) rate_limit_hits: u64,
}

impl GroupState {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            adapted: false,
            queue: VecDeque::new(),
            drain_task: None,
            rate_limit_hits: 0,
        }
    }
}

pub(super) struct LimiterInner {
    pub(super) registry: RateLimitRegistry,
    pub(super) backend: Arc<dyn TokenBackend>,
    pub(super) groups: DashMap<String, Arc<Mutex<GroupState>>>,
    pub(super) settings: LimiterConfig,
    pub(super) events: Arc<dyn EventSink>,
    pub(super) shutdown: AtomicBool,
}

impl LimiterInner {
    pub(super) fn group(&self, group: &str) -> Arc<Mutex<GroupState>> {
        if let Some(state) = self.groups.get(group) {
            return Arc::clone(&state);
        }
        let config = self.registry.get_config(group);
        debug!(group, rate = config.rate, burst = config.burst, "creating rate limit group");
        Arc::clone(
            &self
                .groups
                .entry(group.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(GroupState::new(config)))),
        )
    }

    pub(super) fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Pick up registry changes unless the server has taken over this group
    fn refresh_config(&self, group: &str, state: &mut GroupState) {
        if state.adapted {
            return;
        }
        let config = self.registry.get_config(group);
        if config != state.config {
            debug!(group, rate = config.rate, burst = config.burst, "rate limit reconfigured");
            state.config = config;
        }
    }
}

/// Token bucket rate limiter with one FIFO queue per group
///
/// Cloning is cheap and every clone shares the same buckets and queues.
#[derive(Clone)]
pub struct TokenBucketLimiter {
    pub(super) inner: Arc<LimiterInner>,
}

impl TokenBucketLimiter {
    /// Limiter with in-process buckets reporting to `tracing`
    pub fn new(registry: RateLimitRegistry, settings: LimiterConfig) -> Result<Self> {
        Self::with_parts(
            registry,
            settings,
            Arc::new(LocalTokenBackend::new()),
            Arc::new(TracingEventSink),
        )
    }

    /// Fails with `InvalidConfig` when `settings` do not validate
    pub fn with_parts(
        registry: RateLimitRegistry,
        settings: LimiterConfig,
        backend: Arc<dyn TokenBackend>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        settings.validate()?;
        debug!(backend = backend.name(), "creating token bucket limiter");
        Ok(Self {
            inner: Arc::new(LimiterInner {
                registry,
                backend,
                groups: DashMap::new(),
                settings,
                events,
                shutdown: AtomicBool::new(false),
            }),
        })
    }

    pub fn registry(&self) -> &RateLimitRegistry {
        &self.inner.registry
    }

    /// Wait for a permit in `group`
    ///
    /// Returns immediately when the bucket has a token and nobody is queued
    /// ahead; otherwise the caller is queued until the drain loop admits it,
    /// its queue deadline passes, or the limiter shuts down.
    pub async fn acquire(&self, group: &str) -> Result<()> {
        if self.inner.is_shut_down() {
            return Err(DispatchError::limiter_shutdown(group));
        }

        let handle = self.inner.group(group);
        let receiver = {
            let mut state = handle.lock().await;
            // Shutdown drains queues under this lock; checking again keeps a
            // late caller from slipping into an abandoned queue
            if self.inner.is_shut_down() {
                return Err(DispatchError::limiter_shutdown(group));
            }
            self.inner.refresh_config(group, &mut state);

            if state.queue.is_empty()
                && self
                    .inner
                    .backend
                    .consume_tokens(group, &state.config, 1.0)
                    .await?
            {
                debug!(group, "permit granted immediately");
                return Ok(());
            }

            let (admit, receiver) = oneshot::channel();
            let now = Instant::now();
            state.queue.push_back(QueuedCaller {
                admit,
                enqueued_at: now,
                deadline: now + self.inner.settings.queue_timeout(),
            });
            state.rate_limit_hits += 1;
            self.inner.events.record(DispatchEvent::RateLimitHit {
                group: group.to_string(),
                queue_length: state.queue.len(),
            });
            self.ensure_drain_task(group, &mut state, &handle);
            receiver
        };

        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::limiter_shutdown(group)),
        }
    }

    /// Snapshot of every group's bucket and queue
    pub async fn metrics(&self) -> LimiterMetrics {
        let mut metrics = LimiterMetrics::default();
        for (group, handle) in self.snapshot_groups() {
            let state = handle.lock().await;
            let tokens = match self.inner.backend.get_tokens(&group, &state.config).await {
                Ok(tokens) => tokens,
                Err(e) => {
                    warn!(group = %group, "failed to read tokens for metrics: {}", e);
                    0.0
                }
            };

            metrics.queue_length += state.queue.len();
            metrics.per_group.insert(
                group,
                GroupMetrics {
                    tokens,
                    max_tokens: state.config.burst,
                    queue_length: state.queue.len(),
                    rate_limit_hits: state.rate_limit_hits,
                },
            );
        }
        metrics.active_groups = metrics.per_group.len();
        metrics
    }

    /// Current configuration of `group`, if it has been used
    pub async fn group_config(&self, group: &str) -> Option<RateLimitConfig> {
        let handle = self.inner.groups.get(group).map(|state| Arc::clone(&state))?;
        let config = handle.lock().await.config;
        Some(config)
    }

    /// Reject every queued caller and stop all drain loops
    ///
    /// Later `acquire` calls fail with `LimiterShutdown` as well.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut rejected = 0usize;
        for (group, handle) in self.snapshot_groups() {
            let mut state = handle.lock().await;
            if let Some(task) = state.drain_task.take() {
                task.abort();
            }
            for caller in state.queue.drain(..) {
                let _ = caller
                    .admit
                    .send(Err(DispatchError::limiter_shutdown(group.as_str())));
                rejected += 1;
            }
        }

        info!(rejected, "rate limiter shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }

    fn snapshot_groups(&self) -> Vec<(String, Arc<Mutex<GroupState>>)> {
        self.inner
            .groups
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }
}
