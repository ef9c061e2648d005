//! Error recovery patterns

mod retry;

pub use retry::RetryPolicy;
