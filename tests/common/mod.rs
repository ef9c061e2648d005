//! Common test utilities for rate-dispatch
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::common::MockApi;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let api = MockApi::start().await;
//!     let dispatcher = api.dispatcher();
//!     // ...
//! }
//! ```

pub mod fixtures;

pub use fixtures::{MockApi, TOKEN_PATH};
