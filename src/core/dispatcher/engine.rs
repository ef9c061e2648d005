//! Request orchestration

use super::builder::DispatcherBuilder;
use super::types::{DispatchOptions, DispatchResponse};
use crate::config::{DispatcherConfig, Validate};
use crate::core::auth::{BearerTokenCache, RequestSigner, SigningRequest};
use crate::core::classifier::GroupClassifier;
use crate::core::events::{DispatchEvent, EventSink};
use crate::core::http::{HttpRequest, HttpTransport, Method};
use crate::core::rate_limiter::TokenBucketLimiter;
use crate::utils::error::recovery::RetryPolicy;
use crate::utils::error::{DispatchError, ErrorClassifier, Result};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Sends requests to the remote API under its rate limits
///
/// Each call is classified into a group, waits for that group's limiter,
/// fetches a bearer token, is optionally signed, and is then executed.
/// Failures come back as classified [`DispatchError`]s; throttling and queue
/// timeouts are retried with backoff before being surfaced.
pub struct Dispatcher {
    pub(super) config: DispatcherConfig,
    pub(super) base_url: url::Url,
    pub(super) transport: Arc<dyn HttpTransport>,
    pub(super) classifier: GroupClassifier,
    pub(super) limiter: TokenBucketLimiter,
    pub(super) token_cache: Arc<BearerTokenCache>,
    pub(super) signer: Option<Arc<dyn RequestSigner>>,
    pub(super) error_classifier: ErrorClassifier,
    pub(super) retry: RetryPolicy,
    pub(super) events: Arc<dyn EventSink>,
}

/// One call, resolved once and shared by every attempt
struct Call<'a> {
    method: &'a Method,
    endpoint: &'a str,
    group: &'a str,
    url: &'a str,
    options: &'a DispatchOptions,
    body: Option<&'a Bytes>,
}

impl Dispatcher {
    pub fn builder(config: DispatcherConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    /// Dispatcher with default collaborators
    pub fn from_config(config: DispatcherConfig) -> Result<Self> {
        DispatcherBuilder::new(config).build()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn classifier(&self) -> &GroupClassifier {
        &self.classifier
    }

    pub fn limiter(&self) -> &TokenBucketLimiter {
        &self.limiter
    }

    pub fn token_cache(&self) -> &BearerTokenCache {
        &self.token_cache
    }

    /// Call `path` relative to the base URL
    pub async fn dispatch(
        &self,
        method: Method,
        path: &str,
        options: DispatchOptions,
    ) -> Result<DispatchResponse> {
        // Fail before touching the limiter so bad config costs no permit
        self.validate_credentials()?;

        let group = self.classifier.classify(path);
        let url = self.endpoint_url(path, &options.query)?;
        let body = options
            .body
            .as_ref()
            .map(|value| serde_json::to_vec(value).map(Bytes::from))
            .transpose()
            .map_err(|e| {
                DispatchError::invalid_config(format!("Request body is not serializable: {}", e))
            })?;

        debug!(%method, endpoint = path, group, "dispatching request");
        let call = Call {
            method: &method,
            endpoint: path,
            group,
            url: url.as_str(),
            options: &options,
            body: body.as_ref(),
        };
        let call = &call;

        self.retry
            .call(move |attempt| self.attempt(call, attempt))
            .await
    }

    /// Reject queued callers and stop background work
    pub async fn shutdown(&self) {
        info!("shutting down dispatcher");
        self.limiter.shutdown().await;
    }

    fn validate_credentials(&self) -> Result<()> {
        self.config.credentials.validate()?;
        if let Some(signing) = self.config.active_signing() {
            signing.validate()?;
        }
        Ok(())
    }

    fn endpoint_url(&self, path: &str, query: &[(String, String)]) -> Result<url::Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let mut url = url::Url::parse(&format!("{}/{}", base, path)).map_err(|e| {
            DispatchError::invalid_config(format!("Invalid endpoint path '{}': {}", path, e))
        })?;

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn attempt(&self, call: &Call<'_>, attempt: u32) -> Result<DispatchResponse> {
        // Permit first, token second: queue time must not eat into token lifetime
        self.limiter.acquire(call.group).await?;
        let access_token = self
            .token_cache
            .get_access_token(&self.config.credentials)
            .await
            .map_err(|e| e.in_group(call.group))?;

        let mut request = HttpRequest::new(call.method.clone(), call.url)
            .header("accept", "application/json");
        for (name, value) in &call.options.headers {
            request = request.header(name.to_ascii_lowercase(), value.as_str());
        }
        let token_header = self.config.token.header.to_ascii_lowercase();
        let token_value = if token_header == "authorization" {
            format!("Bearer {}", access_token)
        } else {
            access_token
        };
        request = request.header(token_header, token_value);
        if let Some(body) = call.body {
            request = request
                .header("content-type", "application/json")
                .body(body.clone());
        }

        if let (Some(signer), Some(signing)) = (&self.signer, self.config.active_signing()) {
            let signed = signer.sign(
                &SigningRequest {
                    method: call.method.as_str(),
                    url: call.url,
                    headers: &request.headers,
                    body: request.body.as_deref().unwrap_or_default(),
                },
                &signing.credentials,
                Utc::now(),
            )?;
            request.headers.extend(signed);
        }

        debug!(endpoint = call.endpoint, group = call.group, attempt, "sending request");
        let started = Instant::now();
        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                let error = self
                    .error_classifier
                    .classify_transport(call.endpoint, call.group, &e);
                self.record_failure(call, &error);
                return Err(error);
            }
        };

        self.limiter
            .adapt_from_headers(call.group, &response.headers)
            .await;

        if response.is_success() {
            self.events.record(DispatchEvent::RequestCompleted {
                group: call.group.to_string(),
                endpoint: call.endpoint.to_string(),
                status: response.status,
                elapsed: started.elapsed(),
            });
            return Ok(DispatchResponse::decode(
                response.status,
                response.headers,
                &response.body,
                call.options.response_kind,
            ));
        }

        let error = self.error_classifier.classify(
            call.endpoint,
            call.group,
            response.status,
            &response.text(),
            &response.headers,
        );
        self.record_failure(call, &error);
        Err(error)
    }

    fn record_failure(&self, call: &Call<'_>, error: &DispatchError) {
        self.events.record(DispatchEvent::RequestFailed {
            group: call.group.to_string(),
            endpoint: call.endpoint.to_string(),
            kind: error.kind(),
        });
    }
}
