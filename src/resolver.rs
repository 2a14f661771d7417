//! The resolve pipeline.
//!
//! `IDENTITY_CHECK -> OVERRIDE_EXACT -> OVERRIDE_PARTIAL -> CACHE_LOOKUP ->
//! RACE -> FALLBACK -> DONE | ALL_FAILED`, terminal on the first success.

use crate::anchor::FreshnessAnchor;
use crate::cache::{CacheEntry, CacheKey, FileCacheStore, FreshnessAwareCache};
use crate::config::Config;
use crate::dispatch::{RaceStrategy, SequentialStrategy, TierStrategy};
use crate::error::ResolveError;
use crate::language::canonicalize;
use crate::metrics::ResolveMetrics;
use crate::overrides::{self, JsonFileOverrideStore, OverrideStore};
use crate::providers::{HttpProvider, ProviderRequest, ProviderSet, TranslationProvider};
use anyhow::Result;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    /// Content whose modification invalidates cached translations
    pub anchor: Option<Arc<dyn FreshnessAnchor>>,
}

impl TranslationRequest {
    pub fn new(text: &str, source_lang: &str, target_lang: &str) -> Self {
        Self {
            text: text.to_string(),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            anchor: None,
        }
    }

    pub fn with_anchor(mut self, anchor: Arc<dyn FreshnessAnchor>) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

/// Where a translation came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationSource {
    /// Source and target languages are the same
    None,
    /// Exact administrator override
    Wording,
    Cache,
    /// Named provider that answered this request
    Provider(String),
}

impl TranslationSource {
    pub fn as_str(&self) -> &str {
        match self {
            TranslationSource::None => "none",
            TranslationSource::Wording => "wording",
            TranslationSource::Cache => "cache",
            TranslationSource::Provider(name) => name,
        }
    }
}

impl Serialize for TranslationSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    pub translated: String,
    pub source: TranslationSource,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Wire form of a resolve result:
/// `{ok: true, translated, source, cached, timestamp?}` or `{ok: false, error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResolveResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            translated: None,
            source: None,
            cached: None,
            timestamp: None,
            error: Some(message.into()),
        }
    }
}

impl From<&Result<Resolved, ResolveError>> for ResolveResponse {
    fn from(result: &Result<Resolved, ResolveError>) -> Self {
        match result {
            Ok(resolved) => Self {
                ok: true,
                translated: Some(resolved.translated.clone()),
                source: Some(resolved.source.as_str().to_string()),
                cached: Some(resolved.cached),
                timestamp: resolved.timestamp,
                error: None,
            },
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

pub struct Resolver {
    overrides: Arc<dyn OverrideStore>,
    cache: FreshnessAwareCache,
    providers: ProviderSet,
    race: Arc<dyn TierStrategy>,
    fallback: Arc<dyn TierStrategy>,
    metrics: Arc<ResolveMetrics>,
}

impl Resolver {
    pub fn new(
        overrides: Arc<dyn OverrideStore>,
        cache: FreshnessAwareCache,
        providers: ProviderSet,
    ) -> Self {
        Self {
            overrides,
            cache,
            providers,
            race: Arc::new(RaceStrategy),
            fallback: Arc::new(SequentialStrategy),
            metrics: Arc::new(ResolveMetrics::new()),
        }
    }

    /// Replace the tier strategies.
    pub fn with_strategies(
        mut self,
        race: Arc<dyn TierStrategy>,
        fallback: Arc<dyn TierStrategy>,
    ) -> Self {
        self.race = race;
        self.fallback = fallback;
        self
    }

    /// Build a resolver backed by the file stores and HTTP providers named
    /// in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let providers = config
            .providers
            .iter()
            .map(|settings| {
                HttpProvider::new(settings, config.timeouts)
                    .map(|p| Arc::new(p) as Arc<dyn TranslationProvider>)
            })
            .collect::<Result<Vec<_>>>()?;
        let providers = ProviderSet::new(providers, config.race_size);
        info!("Translation providers: {:?}", providers);

        let cache = FreshnessAwareCache::new(Arc::new(FileCacheStore::new(&config.cache_dir)))
            .with_ttl(config.cache_ttl());
        let overrides = Arc::new(JsonFileOverrideStore::new(&config.overrides_file));

        Ok(Self::new(overrides, cache, providers))
    }

    pub fn overrides(&self) -> &Arc<dyn OverrideStore> {
        &self.overrides
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub fn metrics(&self) -> &ResolveMetrics {
        &self.metrics
    }

    pub async fn resolve(&self, request: &TranslationRequest) -> Result<Resolved, ResolveError> {
        let source_lang = canonicalize(&request.source_lang);
        let target_lang = canonicalize(&request.target_lang);

        if source_lang == target_lang {
            return Ok(Resolved {
                translated: request.text.clone(),
                source: TranslationSource::None,
                cached: false,
                timestamp: None,
            });
        }

        if request.text.trim().is_empty() {
            return Err(ResolveError::EmptyText);
        }

        let table = self.overrides.get().await;
        let applied = overrides::apply(&request.text, &target_lang, &table);
        if let (true, Some(wording)) = (applied.short_circuit, applied.result) {
            debug!("Exact override for {}", target_lang);
            self.metrics.record_override_hit();
            return Ok(Resolved {
                translated: wording,
                source: TranslationSource::Wording,
                cached: false,
                timestamp: None,
            });
        }
        let final_text = applied.final_text;

        let key = CacheKey::derive(&final_text, &source_lang, &target_lang);
        if let Some(entry) = self.cache.get(&key, request.anchor.as_deref()).await {
            debug!("Cache hit {} (from {})", key, entry.provider);
            self.metrics.record_cache_hit();
            return Ok(Resolved {
                translated: entry.translated_text,
                source: TranslationSource::Cache,
                cached: true,
                timestamp: Some(entry.timestamp),
            });
        }
        self.metrics.record_cache_miss();

        let job = ProviderRequest {
            text: final_text,
            source_lang,
            target_lang,
        };

        let raced = self.race.run(&job, self.providers.race_tier()).await;
        self.metrics
            .record_provider_calls(raced.attempted, raced.failures.len());

        let (winner, last_error) = match raced.winner {
            Some(translation) => (Some(translation), None),
            None => {
                info!(
                    "Race tier failed for {} -> {}, trying {} fallback provider(s)",
                    job.source_lang,
                    job.target_lang,
                    self.providers.fallback_tier().len()
                );
                let fell_back = self.fallback.run(&job, self.providers.fallback_tier()).await;
                self.metrics
                    .record_provider_calls(fell_back.attempted, fell_back.failures.len());
                let last_error = fell_back
                    .last_error()
                    .or_else(|| raced.last_error())
                    .cloned();
                (fell_back.winner, last_error)
            }
        };

        let Some(translation) = winner else {
            self.metrics.record_exhausted();
            let message = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no translation providers configured".to_string());
            error!("All translation providers exhausted: {}", message);
            return Err(ResolveError::AllProvidersExhausted { message });
        };

        let timestamp = chrono::Utc::now().timestamp();
        self.cache
            .put(&CacheEntry::new(
                &key,
                &translation.text,
                &translation.provider,
                timestamp,
            ))
            .await;

        Ok(Resolved {
            translated: translation.text,
            source: TranslationSource::Provider(translation.provider),
            cached: false,
            timestamp: Some(timestamp),
        })
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::FixedAnchor;
    use crate::cache::InMemoryCacheStore;
    use crate::error::FailureKind;
    use crate::overrides::{InMemoryOverrideStore, OverrideTable};
    use crate::testing::{FakeProvider, Reply};

    struct Harness {
        resolver: Resolver,
        store: Arc<InMemoryCacheStore>,
    }

    fn harness(
        table: OverrideTable,
        providers: &[&Arc<FakeProvider>],
        race_size: usize,
    ) -> Harness {
        let store = Arc::new(InMemoryCacheStore::new());
        let providers = ProviderSet::new(providers.iter().map(|p| p.shared()).collect(), race_size);
        let resolver = Resolver::new(
            Arc::new(InMemoryOverrideStore::new(table)),
            FreshnessAwareCache::new(store.clone()),
            providers,
        );
        Harness { resolver, store }
    }

    fn overrides(pairs: &[(&str, &str, &str)]) -> OverrideTable {
        let mut table = OverrideTable::new();
        for (lang, key, value) in pairs {
            table.insert(lang, key, value);
        }
        table
    }

    #[tokio::test]
    async fn test_identity_bypasses_everything() {
        let provider = FakeProvider::new("p", Reply::success("never"));
        let h = harness(overrides(&[("en", "Hello", "Hi")]), &[&provider], 1);

        let resolved = h
            .resolver
            .resolve(&TranslationRequest::new("Hello", "en", "EN"))
            .await
            .unwrap();

        assert_eq!(resolved.translated, "Hello");
        assert_eq!(resolved.source, TranslationSource::None);
        assert_eq!(h.store.loads(), 0);
        assert_eq!(provider.started(), 0);
    }

    #[tokio::test]
    async fn test_identity_applies_to_empty_text() {
        let h = harness(OverrideTable::new(), &[], 0);
        let resolved = h
            .resolver
            .resolve(&TranslationRequest::new("", "fr", "fr"))
            .await
            .unwrap();
        assert_eq!(resolved.translated, "");
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let provider = FakeProvider::new("p", Reply::success("x"));
        let h = harness(OverrideTable::new(), &[&provider], 1);

        let result = h
            .resolver
            .resolve(&TranslationRequest::new("   ", "zh-TW", "en"))
            .await;

        assert_eq!(result, Err(ResolveError::EmptyText));
        assert_eq!(provider.started(), 0);
    }

    #[tokio::test]
    async fn test_exact_override_never_touches_cache_or_providers() {
        let provider = FakeProvider::new("p", Reply::failure(FailureKind::NetworkError));
        let h = harness(overrides(&[("en", "你好", "Hi there")]), &[&provider], 1);

        let resolved = h
            .resolver
            .resolve(&TranslationRequest::new("你好", "zh-TW", "en"))
            .await
            .unwrap();

        assert_eq!(resolved.translated, "Hi there");
        assert_eq!(resolved.source, TranslationSource::Wording);
        assert!(!resolved.cached);
        assert_eq!(h.store.loads(), 0);
        assert_eq!(h.store.stores(), 0);
        assert_eq!(provider.started(), 0);
        assert_eq!(h.resolver.metrics().override_hits(), 1);
    }

    #[tokio::test]
    async fn test_partial_override_feeds_providers_and_cache_key() {
        let provider = FakeProvider::new("p", Reply::success("Welcome to ACME"));
        let h = harness(overrides(&[("en", "公司", "ACME")]), &[&provider], 1);

        h.resolver
            .resolve(&TranslationRequest::new("欢迎来到公司", "zh-CN", "en"))
            .await
            .unwrap();

        assert_eq!(provider.last_text().as_deref(), Some("欢迎来到ACME"));
        let key = CacheKey::derive("欢迎来到ACME", "zh-CN", "en");
        assert!(h.store.entry(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_provider_success_is_cached_then_reused() {
        let provider = FakeProvider::new("lingva", Reply::success("Hello"));
        let h = harness(OverrideTable::new(), &[&provider], 1);
        let request = TranslationRequest::new("你好", "zh-TW", "en");

        let first = h.resolver.resolve(&request).await.unwrap();
        let second = h.resolver.resolve(&request).await.unwrap();

        assert_eq!(first.source, TranslationSource::Provider("lingva".to_string()));
        assert!(!first.cached);
        assert!(first.timestamp.is_some());
        assert_eq!(second.translated, first.translated);
        assert_eq!(second.source, TranslationSource::Cache);
        assert!(second.cached);
        assert_eq!(second.timestamp, first.timestamp);
        assert_eq!(provider.started(), 1);
    }

    #[tokio::test]
    async fn test_language_tags_canonicalized_for_cache() {
        let provider = FakeProvider::new("p", Reply::success("Hello"));
        let h = harness(OverrideTable::new(), &[&provider], 1);

        h.resolver
            .resolve(&TranslationRequest::new("你好", "zh_tw", "EN"))
            .await
            .unwrap();
        let again = h
            .resolver
            .resolve(&TranslationRequest::new("你好", "zh-TW", "en"))
            .await
            .unwrap();

        assert!(again.cached);
    }

    #[tokio::test]
    async fn test_stale_entry_requeries_providers() {
        let provider = FakeProvider::new("p", Reply::success("Hello"));
        let h = harness(OverrideTable::new(), &[&provider], 1);

        h.resolver
            .resolve(&TranslationRequest::new("你好", "zh-TW", "en"))
            .await
            .unwrap();

        provider.set_reply(Reply::success("Hi"));
        let future_edit = Arc::new(FixedAnchor(chrono::Utc::now().timestamp() + 3_600));
        let resolved = h
            .resolver
            .resolve(&TranslationRequest::new("你好", "zh-TW", "en").with_anchor(future_edit))
            .await
            .unwrap();

        assert_eq!(resolved.translated, "Hi");
        assert!(!resolved.cached);
        assert_eq!(provider.started(), 2);
    }

    #[tokio::test]
    async fn test_fallback_runs_after_race_fails() {
        let r1 = FakeProvider::new("r1", Reply::failure(FailureKind::RateLimited));
        let r2 = FakeProvider::new("r2", Reply::failure(FailureKind::AuthRequired));
        let f1 = FakeProvider::new("f1", Reply::success("Hello"));
        let h = harness(OverrideTable::new(), &[&r1, &r2, &f1], 2);

        let resolved = h
            .resolver
            .resolve(&TranslationRequest::new("你好", "zh-TW", "en"))
            .await
            .unwrap();

        assert_eq!(resolved.source, TranslationSource::Provider("f1".to_string()));
        assert_eq!(h.resolver.metrics().provider_calls(), 3);
        assert_eq!(h.resolver.metrics().provider_failures(), 2);
    }

    #[tokio::test]
    async fn test_race_success_skips_fallback() {
        let r1 = FakeProvider::new("r1", Reply::success("Hello"));
        let f1 = FakeProvider::new("f1", Reply::success("Other"));
        let h = harness(OverrideTable::new(), &[&r1, &f1], 1);

        h.resolver
            .resolve(&TranslationRequest::new("你好", "zh-TW", "en"))
            .await
            .unwrap();

        assert_eq!(f1.started(), 0);
    }

    #[tokio::test]
    async fn test_all_failed_reports_last_error_and_caches_nothing() {
        let r1 = FakeProvider::new("r1", Reply::failure(FailureKind::RateLimited));
        let f1 = FakeProvider::new(
            "f1",
            Reply::Failure(FailureKind::NetworkError, "connection reset".to_string()),
        );
        let h = harness(OverrideTable::new(), &[&r1, &f1], 1);

        let result = h
            .resolver
            .resolve(&TranslationRequest::new("你好", "zh-TW", "en"))
            .await;

        match result {
            Err(ResolveError::AllProvidersExhausted { message }) => {
                assert!(message.contains("f1"), "message: {}", message);
                assert!(message.contains("connection reset"), "message: {}", message);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert!(h.store.is_empty().await);
        assert_eq!(h.resolver.metrics().exhausted(), 1);
    }

    #[tokio::test]
    async fn test_no_providers_configured() {
        let h = harness(OverrideTable::new(), &[], 0);
        let result = h
            .resolver
            .resolve(&TranslationRequest::new("你好", "zh-TW", "en"))
            .await;

        assert_eq!(
            result,
            Err(ResolveError::AllProvidersExhausted {
                message: "no translation providers configured".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_blank_provider_answer_is_not_a_success() {
        let provider = FakeProvider::new("p", Reply::success("   "));
        let h = harness(OverrideTable::new(), &[&provider], 1);
        let request = TranslationRequest::new("你好", "zh-TW", "en");

        for _ in 0..2 {
            match h.resolver.resolve(&request).await {
                Err(ResolveError::AllProvidersExhausted { message }) => {
                    assert!(message.contains("malformed response"), "message: {}", message);
                }
                other => panic!("expected exhaustion, got {:?}", other),
            }
        }
        assert_eq!(h.store.stores(), 0);
    }

    #[tokio::test]
    async fn test_provider_answer_is_trimmed_before_caching() {
        let provider = FakeProvider::new("p", Reply::success("  Hello\n"));
        let h = harness(OverrideTable::new(), &[&provider], 1);
        let request = TranslationRequest::new("你好", "zh-TW", "en");

        let first = h.resolver.resolve(&request).await.unwrap();
        let second = h.resolver.resolve(&request).await.unwrap();

        assert_eq!(first.translated, "Hello");
        assert!(second.cached);
        assert_eq!(provider.started(), 1);
    }

    #[tokio::test]
    async fn test_different_inputs_substituted_to_same_text_share_cache() {
        let provider = FakeProvider::new("p", Reply::success("Welcome to ACME"));
        let h = harness(
            overrides(&[("en", "公司", "ACME"), ("en", "集团", "ACME")]),
            &[&provider],
            1,
        );

        let a = h
            .resolver
            .resolve(&TranslationRequest::new("欢迎来到公司", "zh-CN", "en"))
            .await
            .unwrap();
        let b = h
            .resolver
            .resolve(&TranslationRequest::new("欢迎来到集团", "zh-CN", "en"))
            .await
            .unwrap();

        assert_eq!(a.source, TranslationSource::Provider("p".to_string()));
        assert_eq!(b.source, TranslationSource::Cache);
        assert!(b.cached);
        assert_eq!(b.translated, a.translated);
        assert_eq!(provider.started(), 1);
        assert_eq!(h.store.len().await, 1);
    }

    /// Records the providers handed to it, then runs them sequentially.
    #[derive(Default)]
    struct RecordingStrategy {
        seen: std::sync::Mutex<Vec<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl TierStrategy for RecordingStrategy {
        async fn run(
            &self,
            request: &ProviderRequest,
            providers: &[Arc<dyn TranslationProvider>],
        ) -> crate::dispatch::TierOutcome {
            self.seen
                .lock()
                .unwrap()
                .push(providers.iter().map(|p| p.name().to_string()).collect());
            crate::dispatch::fallback(request, providers).await
        }
    }

    #[tokio::test]
    async fn test_custom_strategies_receive_their_tiers() {
        let r1 = FakeProvider::new("r1", Reply::failure(FailureKind::RateLimited));
        let r2 = FakeProvider::new("r2", Reply::failure(FailureKind::NetworkError));
        let f1 = FakeProvider::new("f1", Reply::success("Hello"));
        let race = Arc::new(RecordingStrategy::default());
        let fallback = Arc::new(RecordingStrategy::default());

        let h = harness(OverrideTable::new(), &[&r1, &r2, &f1], 2);
        let resolver = h
            .resolver
            .with_strategies(race.clone(), fallback.clone());

        let resolved = resolver
            .resolve(&TranslationRequest::new("你好", "zh-TW", "en"))
            .await
            .unwrap();

        assert_eq!(resolved.source, TranslationSource::Provider("f1".to_string()));
        assert_eq!(*race.seen.lock().unwrap(), vec![vec!["r1", "r2"]]);
        assert_eq!(*fallback.seen.lock().unwrap(), vec![vec!["f1"]]);
    }

    #[test]
    fn test_response_wire_shape() {
        let ok: Result<Resolved, ResolveError> = Ok(Resolved {
            translated: "Hello".to_string(),
            source: TranslationSource::Provider("lingva".to_string()),
            cached: false,
            timestamp: Some(1_700_000_000),
        });
        let json = serde_json::to_value(ResolveResponse::from(&ok)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "ok": true,
                "translated": "Hello",
                "source": "lingva",
                "cached": false,
                "timestamp": 1_700_000_000
            })
        );

        let failed: Result<Resolved, ResolveError> = Err(ResolveError::EmptyText);
        let json = serde_json::to_value(ResolveResponse::from(&failed)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ok": false, "error": "text to translate is empty"})
        );
    }

    #[test]
    fn test_source_serializes_as_plain_string() {
        assert_eq!(
            serde_json::to_value(TranslationSource::Wording).unwrap(),
            serde_json::json!("wording")
        );
    }
}
