use super::normalizer::ResponseNormalizer;
use super::{
    ProviderKind, ProviderOutcome, ProviderRequest, ProviderSettings, Timeouts, Translation,
    TranslationProvider,
};
use crate::error::{FailureKind, ProviderFailure};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Instant;
use tracing::debug;

/// A provider reached over HTTP, with its own client so connect and request
/// timeouts apply to this provider only.
#[derive(Debug)]
pub struct HttpProvider {
    kind: ProviderKind,
    endpoint: String,
    credential: Option<String>,
    client: reqwest::Client,
    normalizer: Box<dyn ResponseNormalizer>,
}

impl HttpProvider {
    pub fn new(settings: &ProviderSettings, timeouts: Timeouts) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .build()
            .context("Failed to build HTTP client for translation provider")?;

        Ok(Self {
            kind: settings.kind,
            endpoint: settings.endpoint.clone(),
            credential: settings.credential.clone(),
            client,
            normalizer: settings.kind.normalizer(),
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn failure(&self, kind: FailureKind, message: impl Into<String>) -> ProviderOutcome {
        ProviderOutcome::Failure(ProviderFailure::new(self.kind.name(), kind, message))
    }

    async fn fetch(&self, request: &ProviderRequest) -> Result<(StatusCode, String), ProviderOutcome> {
        let builder = self
            .kind
            .build_request(&self.client, &self.endpoint, self.credential.as_deref(), request)
            .map_err(|e| self.failure(FailureKind::NetworkError, format!("bad endpoint: {}", e)))?;

        let response = builder
            .send()
            .await
            .map_err(|e| self.failure(FailureKind::NetworkError, describe_transport_error(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.failure(FailureKind::NetworkError, describe_transport_error(&e)))?;

        Ok((status, body))
    }
}

#[async_trait]
impl TranslationProvider for HttpProvider {
    fn name(&self) -> &str {
        self.kind.name()
    }

    async fn attempt(&self, request: &ProviderRequest) -> ProviderOutcome {
        let started = Instant::now();
        let (status, body) = match self.fetch(request).await {
            Ok(response) => response,
            Err(outcome) => return outcome,
        };
        debug!(
            "{} answered {} in {:?}",
            self.kind.name(),
            status,
            started.elapsed()
        );

        if let Some((kind, message)) = classify_status(status, &body) {
            return self.failure(kind, message);
        }

        match self.normalizer.normalize(&body) {
            Ok(text) => ProviderOutcome::Success(Translation {
                text,
                provider: self.kind.name().to_string(),
            }),
            Err(e) => self.failure(e.kind, e.message),
        }
    }
}

/// Classify a non-success HTTP status. Returns `None` for 2xx.
fn classify_status(status: StatusCode, body: &str) -> Option<(FailureKind, String)> {
    if status.is_success() {
        return None;
    }

    let lowered = body.to_lowercase();
    let mentions_key = lowered.contains("api key") || lowered.contains("api_key");

    let kind = match status {
        StatusCode::TOO_MANY_REQUESTS => FailureKind::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureKind::AuthRequired,
        StatusCode::BAD_REQUEST if mentions_key => FailureKind::AuthRequired,
        _ => FailureKind::NetworkError,
    };

    let preview: String = body.trim().chars().take(120).collect();
    Some((kind, format!("HTTP {}: {}", status, preview)))
}

fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("timed out: {}", error)
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        format!("request failed: {}", error)
    }
}
