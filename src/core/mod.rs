//! Core functionality for the dispatcher
//!
//! This module contains the request pipeline and everything it is built from.

pub mod auth;
pub mod classifier; // Endpoint to group mapping
pub mod dispatcher;
pub mod events; // Metrics and audit hooks
pub mod http;
pub mod rate_limiter; // Rate limiting system
