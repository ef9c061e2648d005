//! Error types for the dispatcher

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for the dispatcher
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Discriminant of [`DispatchError`], used for matching, logging and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidConfig,
    Throttled,
    AuthFailed,
    AuthExchangeError,
    NotFound,
    ApiError,
    ClientError,
    ServerError,
    SigningError,
    Timeout,
    ConnectionFailed,
    UnknownNetworkError,
    LimiterShutdown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidConfig => "InvalidConfig",
            Self::Throttled => "Throttled",
            Self::AuthFailed => "AuthFailed",
            Self::AuthExchangeError => "AuthExchangeError",
            Self::NotFound => "NotFound",
            Self::ApiError => "ApiError",
            Self::ClientError => "ClientError",
            Self::ServerError => "ServerError",
            Self::SigningError => "SigningError",
            Self::Timeout => "Timeout",
            Self::ConnectionFailed => "ConnectionFailed",
            Self::UnknownNetworkError => "UnknownNetworkError",
            Self::LimiterShutdown => "LimiterShutdown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the dispatcher
///
/// Every variant is constructed once, either by the [`ErrorClassifier`](super::ErrorClassifier),
/// by the limiter, or by configuration checks, and is never mutated afterwards.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("InvalidConfig: {message}")]
    InvalidConfig { message: String },

    #[error(
        "Throttled on {endpoint} (group {group}): {message}; retry after {:.1}s",
        .retry_after.as_secs_f64()
    )]
    Throttled {
        endpoint: String,
        group: String,
        message: String,
        retry_after: Duration,
    },

    #[error("AuthFailed on {endpoint} (group {group}, status {status}): {message}")]
    AuthFailed {
        endpoint: String,
        group: String,
        status: u16,
        message: String,
    },

    #[error(
        "AuthExchangeError for client {client_id} at {endpoint} (group {}): {message}",
        .group.as_deref().unwrap_or("none")
    )]
    AuthExchange {
        client_id: String,
        /// Token endpoint that was called
        endpoint: String,
        /// Set once the dispatcher knows which call needed the token
        group: Option<String>,
        status: Option<u16>,
        message: String,
    },

    #[error("NotFound on {endpoint} (group {group}): {message}")]
    NotFound {
        endpoint: String,
        group: String,
        message: String,
    },

    #[error("ApiError on {endpoint} (group {group}, status {status}): {code}: {message} [{details}]")]
    Api {
        endpoint: String,
        group: String,
        status: u16,
        /// Code of the first reported error
        code: String,
        /// Message of the first reported error
        message: String,
        /// Every reported error, joined for diagnostics
        details: String,
    },

    #[error("ClientError on {endpoint} (group {group}, status {status}): {message}")]
    Client {
        endpoint: String,
        group: String,
        status: u16,
        message: String,
    },

    #[error("ServerError on {endpoint} (group {group}, status {status}): {message}")]
    Server {
        endpoint: String,
        group: String,
        status: u16,
        message: String,
    },

    #[error("SigningError for {endpoint}: {message}")]
    Signing { endpoint: String, message: String },

    /// No limiter slot became available before the queue deadline
    #[error(
        "Timeout waiting for a rate limit slot in group {group} after {}ms ({attempts} attempt(s)); retry after {:.1}s",
        .waited.as_millis(),
        .retry_after.as_secs_f64()
    )]
    QueueTimeout {
        group: String,
        waited: Duration,
        attempts: u32,
        retry_after: Duration,
    },

    /// The transport timed out or the connection was aborted mid-flight
    #[error(
        "Timeout calling {endpoint} (group {group}): {message}; retry after {:.1}s",
        .retry_after.as_secs_f64()
    )]
    Timeout {
        endpoint: String,
        group: String,
        message: String,
        retry_after: Duration,
    },

    #[error("ConnectionFailed for {endpoint} (group {group}): {message}")]
    ConnectionFailed {
        endpoint: String,
        group: String,
        message: String,
    },

    #[error("UnknownNetworkError for {endpoint} (group {group}): {message}")]
    UnknownNetwork {
        endpoint: String,
        group: String,
        message: String,
    },

    #[error("LimiterShutdown: group {group} will never be admitted, the limiter is shutting down")]
    LimiterShutdown { group: String },
}

impl DispatchError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn signing(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Signing {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn auth_exchange(
        client_id: impl Into<String>,
        endpoint: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::AuthExchange {
            client_id: client_id.into(),
            endpoint: endpoint.into(),
            group: None,
            status,
            message: message.into(),
        }
    }

    pub fn queue_timeout(
        group: impl Into<String>,
        waited: Duration,
        retry_after: Duration,
    ) -> Self {
        Self::QueueTimeout {
            group: group.into(),
            waited,
            attempts: 1,
            retry_after,
        }
    }

    pub fn limiter_shutdown(group: impl Into<String>) -> Self {
        Self::LimiterShutdown {
            group: group.into(),
        }
    }

    /// Get the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::Throttled { .. } => ErrorKind::Throttled,
            Self::AuthFailed { .. } => ErrorKind::AuthFailed,
            Self::AuthExchange { .. } => ErrorKind::AuthExchangeError,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Api { .. } => ErrorKind::ApiError,
            Self::Client { .. } => ErrorKind::ClientError,
            Self::Server { .. } => ErrorKind::ServerError,
            Self::Signing { .. } => ErrorKind::SigningError,
            Self::QueueTimeout { .. } | Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ConnectionFailed { .. } => ErrorKind::ConnectionFailed,
            Self::UnknownNetwork { .. } => ErrorKind::UnknownNetworkError,
            Self::LimiterShutdown { .. } => ErrorKind::LimiterShutdown,
        }
    }

    /// Whether the dispatcher retries this error on its own
    ///
    /// Only server throttling and limiter queue timeouts qualify. Server errors
    /// are left to the caller's policy; transport timeouts are not replayed
    /// because the request may already have reached the server.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::QueueTimeout { .. })
    }

    /// How long the caller should wait before trying again, when known
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after, .. }
            | Self::QueueTimeout { retry_after, .. }
            | Self::Timeout { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Rate limit group the failing call belonged to, if any
    pub fn group(&self) -> Option<&str> {
        match self {
            Self::Throttled { group, .. }
            | Self::AuthFailed { group, .. }
            | Self::NotFound { group, .. }
            | Self::Api { group, .. }
            | Self::Client { group, .. }
            | Self::Server { group, .. }
            | Self::QueueTimeout { group, .. }
            | Self::Timeout { group, .. }
            | Self::ConnectionFailed { group, .. }
            | Self::UnknownNetwork { group, .. }
            | Self::LimiterShutdown { group } => Some(group),
            Self::AuthExchange { group, .. } => group.as_deref(),
            Self::InvalidConfig { .. } | Self::Signing { .. } => None,
        }
    }

    /// HTTP status reported by the remote API, if the error came from a response
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Throttled { .. } => Some(429),
            Self::AuthFailed { status, .. }
            | Self::Api { status, .. }
            | Self::Client { status, .. }
            | Self::Server { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            Self::AuthExchange { status, .. } => *status,
            _ => None,
        }
    }

    /// Attach the group of the call a token exchange was made for
    pub(crate) fn in_group(self, group: &str) -> Self {
        match self {
            Self::AuthExchange {
                client_id,
                endpoint,
                status,
                message,
                ..
            } => Self::AuthExchange {
                client_id,
                endpoint,
                group: Some(group.to_string()),
                status,
                message,
            },
            other => other,
        }
    }

    /// Record how many acquisition attempts a queue timeout survived
    pub(crate) fn with_attempts(self, attempts: u32) -> Self {
        match self {
            Self::QueueTimeout {
                group,
                waited,
                retry_after,
                ..
            } => Self::QueueTimeout {
                group,
                waited,
                attempts,
                retry_after,
            },
            other => other,
        }
    }
}

/// Failure of the underlying HTTP transport, before any response was received
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection aborted: {0}")]
    ConnectionAborted(String),

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();

        if err.is_timeout() {
            return Self::Timeout(message);
        }

        // Walk the source chain: reqwest wraps hyper, which wraps the io error
        let mut source = std::error::Error::source(&err);
        let mut chain = String::new();
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::TimedOut => return Self::Timeout(message),
                    std::io::ErrorKind::ConnectionRefused => {
                        return Self::ConnectionRefused(message);
                    }
                    std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof => {
                        return Self::ConnectionAborted(message);
                    }
                    _ => {}
                }
            }
            chain.push_str(&cause.to_string().to_lowercase());
            chain.push(' ');
            source = cause.source();
        }

        if chain.contains("dns") || chain.contains("lookup") || chain.contains("resolve") {
            Self::Dns(message)
        } else if err.is_connect() {
            Self::ConnectionRefused(message)
        } else if chain.contains("reset") || chain.contains("aborted") || chain.contains("closed") {
            Self::ConnectionAborted(message)
        } else {
            Self::Other(message)
        }
    }
}
