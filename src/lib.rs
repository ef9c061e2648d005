//! # rate-dispatch
//!
//! Client-side dispatcher for rate-limited REST APIs.
//!
//! Every outgoing call is classified into an endpoint group, waits for a
//! token from that group's bucket, carries a cached OAuth access token and
//! (optionally) a SigV4 signature, and has its failure classified into a
//! typed error. Limits published by the server in response headers replace
//! the configured ones as soon as they are seen.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rate_dispatch::{Credentials, DispatchOptions, Dispatcher, DispatcherConfig, Method};
//!
//! #[tokio::main]
//! async fn main() -> rate_dispatch::Result<()> {
//!     let config = DispatcherConfig::new(
//!         "https://sellingpartnerapi-eu.amazon.com",
//!         "https://api.amazon.com/auth/o2/token",
//!         Credentials::new("client-id", "client-secret", "refresh-token"),
//!     );
//!     let dispatcher = Dispatcher::from_config(config)?;
//!
//!     let response = dispatcher
//!         .dispatch(
//!             Method::GET,
//!             "/orders/v0/orders",
//!             DispatchOptions::new().query("MarketplaceIds", "A1PA6795UKMFR9"),
//!         )
//!         .await?;
//!     println!("{:?}", response.data);
//!
//!     dispatcher.shutdown().await;
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod core;
pub mod utils;

pub use config::{
    DispatcherConfig, HttpConfig, LimiterConfig, RetryConfig, SigningConfig, TokenConfig,
};
pub use core::auth::{
    BearerTokenCache, Credentials, RequestSigner, SigV4Signer, SigningCredentials,
};
pub use core::classifier::{GroupClassifier, GroupRule, PathPattern};
pub use core::dispatcher::{
    DispatchOptions, DispatchResponse, Dispatcher, DispatcherBuilder, ResponseData, ResponseKind,
};
pub use core::events::{DispatchEvent, EventSink, NoopEventSink, TracingEventSink};
pub use core::http::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
pub use core::rate_limiter::{
    LimiterMetrics, LocalTokenBackend, RateLimitConfig, RateLimitRegistry, TokenBackend,
    TokenBucketLimiter,
};
#[cfg(feature = "redis")]
pub use core::rate_limiter::RedisTokenBackend;
pub use utils::error::{DispatchError, ErrorKind, Result};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Git revision the crate was built from
pub const GIT_HASH: &str = env!("GIT_HASH");
