//! Error handling for the dispatcher
//!
//! This module defines the error taxonomy, the classifier that maps HTTP
//! failures onto it, and the retry policy layered above both.

mod classifier;
pub mod recovery;
mod types;

pub use classifier::{
    ApiErrorDetail, DEFAULT_RETRY_AFTER, ErrorClassifier, TRANSPORT_RETRY_AFTER, parse_error_list,
};
pub use types::{DispatchError, ErrorKind, Result, TransportError};
