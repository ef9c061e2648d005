//! Rate Limiting Implementation
//!
//! Token bucket limiting per endpoint group, with FIFO queuing of callers that
//! arrive while their group's bucket is empty.
//!
//! - `types` - Configs, buckets and metrics snapshots
//! - `registry` - Built-in and overridden limits per group
//! - `backend` - Where token counts live (in-process or shared)
//! - `limiter` - Acquisition, metrics and shutdown
//! - `drain` - Lazily started per-group drain loops
//! - `adaptive` - Limits reported by the server in response headers

mod adaptive;
mod backend;
mod drain;
mod limiter;
#[cfg(feature = "redis")]
mod redis_backend;
mod registry;
mod types;


// Re-export public types
pub use backend::{LocalTokenBackend, TokenBackend};
pub use limiter::TokenBucketLimiter;
#[cfg(feature = "redis")]
pub use redis_backend::RedisTokenBackend;
pub use registry::{DEFAULT_GROUP, EnvOverrideSource, OverrideSource, RateLimitRegistry};
pub use types::{GroupMetrics, LimiterMetrics, RateLimitConfig, TokenBucket};
