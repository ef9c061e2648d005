//! Utility modules for the dispatcher
//!
//! - **error**: Error taxonomy, classification and retry
//! - **logging**: Subscriber setup

pub mod error; // Error handling
pub mod logging; // Logging
