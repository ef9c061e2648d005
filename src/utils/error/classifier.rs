//! Mapping of failed responses and transport errors onto [`DispatchError`]

use super::types::{DispatchError, TransportError};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Wait hint used when a 429 carries no usable `retry-after` header
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Wait hint attached to transport timeouts
pub const TRANSPORT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Longest body excerpt carried in an error message
const MAX_MESSAGE_LEN: usize = 512;

/// One entry of a structured `{"errors": [...]}` response body
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorList {
    errors: Vec<ApiErrorDetail>,
}

/// Turns a failed HTTP exchange into exactly one typed error
///
/// Classification is total: every input produces a value and nothing here
/// panics or returns a `Result`.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    default_retry_after: Duration,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_AFTER)
    }
}

impl ErrorClassifier {
    pub fn new(default_retry_after: Duration) -> Self {
        Self {
            default_retry_after,
        }
    }

    /// Classify a non-success HTTP response
    ///
    /// `headers` is expected to carry lowercase names, as produced by the transport.
    pub fn classify(
        &self,
        endpoint: &str,
        group: &str,
        status: u16,
        body: &str,
        headers: &HashMap<String, String>,
    ) -> DispatchError {
        let errors = parse_error_list(body);
        let message = summarize(body, errors.as_deref());
        let endpoint = endpoint.to_string();
        let group = group.to_string();

        match status {
            429 => DispatchError::Throttled {
                endpoint,
                group,
                message,
                retry_after: self.retry_after(headers),
            },
            401 | 403 => DispatchError::AuthFailed {
                endpoint,
                group,
                status,
                message,
            },
            404 => DispatchError::NotFound {
                endpoint,
                group,
                message,
            },
            _ => match errors {
                Some(errors) if !errors.is_empty() => {
                    let first = &errors[0];
                    DispatchError::Api {
                        endpoint,
                        group,
                        status,
                        code: first.code.clone(),
                        message: first.message.clone(),
                        details: join_details(&errors),
                    }
                }
                _ if (500..=599).contains(&status) => DispatchError::Server {
                    endpoint,
                    group,
                    status,
                    message,
                },
                _ => DispatchError::Client {
                    endpoint,
                    group,
                    status,
                    message,
                },
            },
        }
    }

    /// Classify a failure that happened before any response arrived
    pub fn classify_transport(
        &self,
        endpoint: &str,
        group: &str,
        error: &TransportError,
    ) -> DispatchError {
        let endpoint = endpoint.to_string();
        let group = group.to_string();
        let message = error.to_string();

        match error {
            TransportError::Timeout(_) | TransportError::ConnectionAborted(_) => {
                DispatchError::Timeout {
                    endpoint,
                    group,
                    message,
                    retry_after: TRANSPORT_RETRY_AFTER,
                }
            }
            TransportError::Dns(_) | TransportError::ConnectionRefused(_) => {
                DispatchError::ConnectionFailed {
                    endpoint,
                    group,
                    message,
                }
            }
            TransportError::Other(_) => DispatchError::UnknownNetwork {
                endpoint,
                group,
                message,
            },
        }
    }

    /// Extract the wait hint from `retry-after`, falling back to the default
    pub fn retry_after(&self, headers: &HashMap<String, String>) -> Duration {
        headers
            .get("retry-after")
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|seconds| *seconds >= 0.0)
            // `abs` folds -0 into 0; out-of-range values fall back to the default
            .and_then(|seconds| Duration::try_from_secs_f64(seconds.abs()).ok())
            .unwrap_or(self.default_retry_after)
    }
}

/// Parse a structured error list, if the body carries one
pub fn parse_error_list(body: &str) -> Option<Vec<ApiErrorDetail>> {
    serde_json::from_str::<ErrorList>(body)
        .ok()
        .map(|list| list.errors)
}

fn join_details(errors: &[ApiErrorDetail]) -> String {
    errors
        .iter()
        .map(|e| match &e.details {
            Some(details) if !details.is_empty() => {
                format!("{}: {} ({})", e.code, e.message, details)
            }
            _ => format!("{}: {}", e.code, e.message),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn summarize(body: &str, errors: Option<&[ApiErrorDetail]>) -> String {
    if let Some(first) = errors.and_then(|e| e.first()) {
        return format!("{}: {}", first.code, first.message);
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }

    match trimmed.char_indices().nth(MAX_MESSAGE_LEN) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
