//! Pluggable HTTP transport
//!
//! The dispatcher and the token cache only talk to the network through
//! [`HttpTransport`]; [`ReqwestTransport`] is the default implementation.

mod transport;
mod types;

pub use reqwest::Method;
pub use transport::{HttpTransport, ReqwestTransport};
pub use types::{HttpRequest, HttpResponse};
