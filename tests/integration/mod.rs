//! Integration tests for rate-dispatch
//!
//! These tests run the real HTTP transport against a local mock server.

pub mod config_tests;
pub mod dispatcher_tests;
pub mod limiter_tests;
pub mod token_cache_tests;
