//! Dispatcher builder

use super::engine::Dispatcher;
use crate::config::{DispatcherConfig, Validate};
use crate::core::auth::{BearerTokenCache, RequestSigner, SigV4Signer};
use crate::core::classifier::GroupClassifier;
use crate::core::events::{EventSink, TracingEventSink};
use crate::core::http::{HttpTransport, ReqwestTransport};
use crate::core::rate_limiter::{
    EnvOverrideSource, LocalTokenBackend, RateLimitRegistry, TokenBackend, TokenBucketLimiter,
};
use crate::utils::error::recovery::RetryPolicy;
use crate::utils::error::{DispatchError, ErrorClassifier, Result};
use std::sync::Arc;
use tracing::debug;

/// Assembles a [`Dispatcher`], filling anything not supplied with defaults
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    classifier: Option<GroupClassifier>,
    registry: Option<RateLimitRegistry>,
    backend: Option<Arc<dyn TokenBackend>>,
    events: Option<Arc<dyn EventSink>>,
    signer: Option<Arc<dyn RequestSigner>>,
    error_classifier: Option<ErrorClassifier>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            transport: None,
            classifier: None,
            registry: None,
            backend: None,
            events: None,
            signer: None,
            error_classifier: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_classifier(mut self, classifier: GroupClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_registry(mut self, registry: RateLimitRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Shared token storage, e.g. Redis when several processes use one quota
    pub fn with_backend(mut self, backend: Arc<dyn TokenBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_error_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.error_classifier = Some(classifier);
        self
    }

    /// Validate settings and build
    ///
    /// Credentials are checked on every dispatch instead, so a dispatcher can
    /// be built before they are provisioned.
    pub fn build(self) -> Result<Dispatcher> {
        let config = self.config;
        config.limiter.validate()?;
        config.retry.validate()?;
        config.token.validate()?;
        config.http.validate()?;

        let base_url = url::Url::parse(&config.base_url).map_err(|e| {
            DispatchError::invalid_config(format!("Base URL has invalid URL format: {}", e))
        })?;

        let bearer_in_authorization = config.token.header.eq_ignore_ascii_case("authorization");
        if config.active_signing().is_some() && bearer_in_authorization {
            return Err(DispatchError::invalid_config(
                "Request signing writes the authorization header; \
                 send the access token in another header (token.header)",
            ));
        }

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&config.http)?),
        };
        let events: Arc<dyn EventSink> = self.events.unwrap_or_else(|| Arc::new(TracingEventSink));

        let registry = self.registry.unwrap_or_else(|| {
            RateLimitRegistry::new().with_override_source(Arc::new(EnvOverrideSource::new(
                config.limiter.overrides_env_key.as_str(),
            )))
        });
        let backend: Arc<dyn TokenBackend> = self
            .backend
            .unwrap_or_else(|| Arc::new(LocalTokenBackend::new()));
        let limiter = TokenBucketLimiter::with_parts(
            registry,
            config.limiter.clone(),
            backend,
            events.clone(),
        )?;

        let token_cache = BearerTokenCache::new(transport.clone(), config.token_url.as_str())
            .with_buffer(config.token.buffer())
            .with_event_sink(events.clone());

        let signer = match (self.signer, config.active_signing()) {
            (Some(signer), _) => Some(signer),
            (None, Some(signing)) => {
                Some(Arc::new(SigV4Signer::new(signing.service.as_str())) as Arc<dyn RequestSigner>)
            }
            (None, None) => None,
        };

        debug!(
            base_url = %base_url,
            signing = signer.is_some(),
            "dispatcher built"
        );

        Ok(Dispatcher {
            retry: RetryPolicy::new(config.retry.clone()),
            base_url,
            transport,
            classifier: self.classifier.unwrap_or_default(),
            limiter,
            token_cache: Arc::new(token_cache),
            signer,
            error_classifier: self.error_classifier.unwrap_or_default(),
            events,
            config,
        })
    }
}
