//! Credentials, bearer token caching and request signing
//!
//! - `types` - Credential shapes and cached tokens
//! - `token_cache` - Refresh-token exchange with per-credential caching
//! - `sigv4` - AWS Signature Version 4 request signer

mod sigv4;
mod token_cache;
mod types;

pub use sigv4::{RequestSigner, SigV4Signer, SigningRequest};
pub use token_cache::BearerTokenCache;
pub use types::{CachedToken, Credentials, SigningCredentials};
