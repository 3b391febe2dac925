//! AI provider seam
//!
//! The provider performs the actual document inspection. The pipeline treats
//! it as an opaque, possibly slow, possibly failing dependency: it only sees
//! a JSON result or an error.

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::Client;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProviderConfig;
use crate::error::AnalysisError;
use crate::models::AnalysisType;
use crate::services::documents::DocumentInfo;

/// Longest body excerpt carried into an error message
const BODY_EXCERPT_CHARS: usize = 200;

/// Raw provider payload for one analysis
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutput {
    pub result: Value,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider reported or caused a failure
    #[error("{0}")]
    Failed(String),

    /// Provider answered with something that is not a usable payload
    #[error("{0}")]
    Malformed(String),
}

impl From<ProviderError> for AnalysisError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Failed(msg) => AnalysisError::Provider(msg),
            ProviderError::Malformed(msg) => AnalysisError::MalformedResult(msg),
        }
    }
}

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Name used in logs and the health endpoint
    fn name(&self) -> &str;

    async fn analyze(
        &self,
        document: &DocumentInfo,
        analysis_type: &AnalysisType,
    ) -> Result<ProviderOutput, ProviderError>;
}

/// Provider reached over HTTP
///
/// POSTs `{document, analysis_type, model}` as JSON and expects a JSON object
/// back. Requests are rate limited with a token bucket.
pub struct HttpProvider {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: Option<String>,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpProvider {
    /// `request_timeout` bounds the whole HTTP exchange; the dispatcher
    /// applies its own deadline on top.
    pub fn new(config: &ProviderConfig, request_timeout: Duration) -> plancheck_common::Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                plancheck_common::Error::Config("provider.endpoint is not configured".to_string())
            })?;

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "Provider API key not set, requests will be sent without authorization"
            );
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("plancheck-analysis/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| plancheck_common::Error::Config(format!("HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            plancheck_common::Error::Config("provider.requests_per_second must be at least 1".into())
        })?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            model: config.model.clone(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }
}

#[async_trait]
impl AnalysisProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn analyze(
        &self,
        document: &DocumentInfo,
        analysis_type: &AnalysisType,
    ) -> Result<ProviderOutput, ProviderError> {
        self.rate_limiter.until_ready().await;

        let body = json!({
            "document": document,
            "analysis_type": analysis_type,
            "model": self.model,
        });

        tracing::debug!(
            endpoint = %self.endpoint,
            document_id = document.id,
            analysis_type = %analysis_type,
            "Calling analysis provider"
        );

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Failed(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Failed(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(ProviderError::Failed(format!(
                "provider returned {}: {}",
                status,
                excerpt(&text)
            )));
        }

        let result: Value = serde_json::from_str(&text).map_err(|e| {
            ProviderError::Malformed(format!("response is not JSON ({}): {}", e, excerpt(&text)))
        })?;

        Ok(ProviderOutput { result })
    }
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > BODY_EXCERPT_CHARS {
        let cut: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
        format!("{}...", cut)
    } else {
        trimmed.to_string()
    }
}
