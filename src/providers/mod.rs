//! Translation providers.
//!
//! Every provider, whatever its wire format, is reached through
//! [`TranslationProvider::attempt`], which always yields a
//! [`ProviderOutcome`] and never an error: failures are classified values
//! that the dispatchers record and move past.

mod http;
mod kind;
pub mod normalizer;

pub use http::HttpProvider;
pub use kind::ProviderKind;

use crate::error::ProviderFailure;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Text handed to a provider, already override-substituted, with canonical
/// language tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
}

/// A successful, normalized translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    Success(Translation),
    Failure(ProviderFailure),
}

#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn attempt(&self, request: &ProviderRequest) -> ProviderOutcome;
}

/// Per-provider timeouts. Both apply independently to every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(3000),
            request: Duration::from_millis(8000),
        }
    }
}

/// Static configuration for one HTTP provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub endpoint: String,
    pub credential: Option<String>,
}

impl ProviderSettings {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            endpoint: kind.default_endpoint().to_string(),
            credential: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }
}

/// Ordered providers; the first `race_size` form the race tier.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: Vec<Arc<dyn TranslationProvider>>,
    race_size: usize,
}

impl ProviderSet {
    pub fn new(providers: Vec<Arc<dyn TranslationProvider>>, race_size: usize) -> Self {
        let race_size = race_size.min(providers.len());
        Self {
            providers,
            race_size,
        }
    }

    pub fn race_tier(&self) -> &[Arc<dyn TranslationProvider>] {
        &self.providers[..self.race_size]
    }

    pub fn fallback_tier(&self) -> &[Arc<dyn TranslationProvider>] {
        &self.providers[self.race_size..]
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field("providers", &self.names())
            .field("race_size", &self.race_size)
            .finish()
    }
}
