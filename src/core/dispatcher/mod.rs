//! Rate-limited request dispatch
//!
//! - `types` - Call options and decoded responses
//! - `builder` - Wiring of transport, limiter, token cache and signer
//! - `engine` - The per-call state machine

mod builder;
mod engine;
mod types;

pub use builder::DispatcherBuilder;
pub use engine::Dispatcher;
pub use types::{DispatchOptions, DispatchResponse, ResponseData, ResponseKind};
