//! Tier execution strategies.
//!
//! The race tier overlaps every request on the calling task and keeps the
//! first success; the fallback tier walks its providers one at a time. Both
//! are [`TierStrategy`] implementations so the resolver composes them by
//! tier without knowing how either runs.

use crate::error::{FailureKind, ProviderFailure};
use crate::providers::{ProviderOutcome, ProviderRequest, Translation, TranslationProvider};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What happened when one tier ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierOutcome {
    pub winner: Option<Translation>,
    /// Failures in the order they were observed
    pub failures: Vec<ProviderFailure>,
    /// Number of providers a request was issued to
    pub attempted: usize,
}

impl TierOutcome {
    /// The most recently observed failure.
    pub fn last_error(&self) -> Option<&ProviderFailure> {
        self.failures.last()
    }
}

#[async_trait]
pub trait TierStrategy: Send + Sync {
    async fn run(
        &self,
        request: &ProviderRequest,
        providers: &[Arc<dyn TranslationProvider>],
    ) -> TierOutcome;
}

/// Concurrent strategy backed by [`race`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RaceStrategy;

#[async_trait]
impl TierStrategy for RaceStrategy {
    async fn run(
        &self,
        request: &ProviderRequest,
        providers: &[Arc<dyn TranslationProvider>],
    ) -> TierOutcome {
        race(request, providers).await
    }
}

/// Sequential strategy backed by [`fallback`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialStrategy;

#[async_trait]
impl TierStrategy for SequentialStrategy {
    async fn run(
        &self,
        request: &ProviderRequest,
        providers: &[Arc<dyn TranslationProvider>],
    ) -> TierOutcome {
        fallback(request, providers).await
    }
}

/// Trim a successful translation, turning one with nothing left into a
/// malformed-response failure so blank text is never returned or cached.
fn vet(outcome: ProviderOutcome) -> ProviderOutcome {
    match outcome {
        ProviderOutcome::Success(translation) => {
            let text = translation.text.trim();
            if text.is_empty() {
                ProviderOutcome::Failure(ProviderFailure::new(
                    translation.provider,
                    FailureKind::MalformedResponse,
                    "empty translation",
                ))
            } else {
                ProviderOutcome::Success(Translation {
                    text: text.to_string(),
                    provider: translation.provider,
                })
            }
        }
        failure => failure,
    }
}

/// Run one attempt unless the race has already been decided. The token is
/// checked before the request goes out and again once it completes; a
/// cancelled attempt yields `None` and its result is discarded.
async fn guarded_attempt(
    provider: &dyn TranslationProvider,
    request: &ProviderRequest,
    token: CancellationToken,
) -> Option<ProviderOutcome> {
    if token.is_cancelled() {
        return None;
    }

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => return None,
        outcome = provider.attempt(request) => vet(outcome),
    };

    if token.is_cancelled() {
        debug!("Discarding late result from {}", provider.name());
        return None;
    }
    Some(outcome)
}

/// Query every provider concurrently and return the first success.
///
/// All requests are multiplexed on the current task; nothing is spawned.
/// When one succeeds the shared token is cancelled and the remaining
/// in-flight requests are dropped, which closes their connections. Two
/// requests finishing in the same poll resolve in whatever order the
/// stream yields them.
pub async fn race(
    request: &ProviderRequest,
    providers: &[Arc<dyn TranslationProvider>],
) -> TierOutcome {
    let token = CancellationToken::new();
    let mut pending: FuturesUnordered<_> = providers
        .iter()
        .map(|provider| guarded_attempt(provider.as_ref(), request, token.clone()))
        .collect();

    let mut outcome = TierOutcome {
        attempted: providers.len(),
        ..TierOutcome::default()
    };

    while let Some(completed) = pending.next().await {
        match completed {
            Some(ProviderOutcome::Success(translation)) => {
                token.cancel();
                info!(
                    "{} won the race ({} other request(s) abandoned)",
                    translation.provider,
                    pending.len()
                );
                outcome.winner = Some(translation);
                return outcome;
            }
            Some(ProviderOutcome::Failure(failure)) => {
                warn!("Race attempt failed: {}", failure);
                outcome.failures.push(failure);
            }
            None => {}
        }
    }

    outcome
}

/// Query providers strictly one at a time, stopping at the first success.
pub async fn fallback(
    request: &ProviderRequest,
    providers: &[Arc<dyn TranslationProvider>],
) -> TierOutcome {
    let mut outcome = TierOutcome::default();

    for provider in providers {
        outcome.attempted += 1;
        match vet(provider.attempt(request).await) {
            ProviderOutcome::Success(translation) => {
                info!("Fallback provider {} succeeded", translation.provider);
                outcome.winner = Some(translation);
                return outcome;
            }
            ProviderOutcome::Failure(failure) => {
                warn!("Fallback attempt failed: {}", failure);
                outcome.failures.push(failure);
            }
        }
    }

    outcome
}
