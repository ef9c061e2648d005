//! Metrics and audit hooks
//!
//! The limiter, the token cache and the dispatcher report what they do through
//! a narrow [`EventSink`] handed to them at construction. Nothing in the core
//! depends on a particular metrics or audit backend.

use crate::core::rate_limiter::RateLimitConfig;
use crate::utils::error::ErrorKind;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Something worth counting or auditing
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// A caller found its group's bucket empty and was queued
    RateLimitHit { group: String, queue_length: usize },
    /// A queued caller was admitted
    Admitted { group: String, waited: Duration },
    /// A queued caller gave up waiting
    QueueTimeout { group: String, waited: Duration },
    /// The server reported a new limit for a group
    RateLimitAdapted {
        group: String,
        config: RateLimitConfig,
    },
    TokenRefreshed {
        client_id: String,
        expires_in: Duration,
    },
    RequestCompleted {
        group: String,
        endpoint: String,
        status: u16,
        elapsed: Duration,
    },
    RequestFailed {
        group: String,
        endpoint: String,
        kind: ErrorKind,
    },
}

/// Receiver of [`DispatchEvent`]s
pub trait EventSink: Send + Sync {
    fn record(&self, event: DispatchEvent);
}

/// Writes every event to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: DispatchEvent) {
        match event {
            DispatchEvent::RateLimitHit {
                group,
                queue_length,
            } => debug!(%group, queue_length, "rate limit hit, caller queued"),
            DispatchEvent::Admitted { group, waited } => {
                debug!(%group, waited_ms = waited.as_millis() as u64, "queued caller admitted")
            }
            DispatchEvent::QueueTimeout { group, waited } => {
                warn!(%group, waited_ms = waited.as_millis() as u64, "queued caller timed out")
            }
            DispatchEvent::RateLimitAdapted { group, config } => {
                info!(%group, rate = config.rate, burst = config.burst, "rate limit adapted")
            }
            DispatchEvent::TokenRefreshed {
                client_id,
                expires_in,
            } => info!(
                %client_id,
                expires_in_secs = expires_in.as_secs(),
                "access token refreshed"
            ),
            DispatchEvent::RequestCompleted {
                group,
                endpoint,
                status,
                elapsed,
            } => debug!(
                %group,
                %endpoint,
                status,
                elapsed_ms = elapsed.as_millis() as u64,
                "request completed"
            ),
            DispatchEvent::RequestFailed {
                group,
                endpoint,
                kind,
            } => warn!(%group, %endpoint, %kind, "request failed"),
        }
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&self, _event: DispatchEvent) {}
}

/// Forwards events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<DispatchEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn record(&self, event: DispatchEvent) {
        // A dropped receiver only means nobody is listening anymore
        let _ = self.sender.send(event);
    }
}
