use thiserror::Error;

/// Classification of a single failed provider attempt.
///
/// Every variant is non-fatal to a resolve: the failure is recorded as the
/// "last error" and the next provider is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FailureKind {
    /// HTTP 429 or a provider-level quota signal
    #[error("rate limited")]
    RateLimited,
    /// The provider demands credentials that are not configured
    #[error("authentication required")]
    AuthRequired,
    /// Non-structured payload, parse failure, missing field or empty result
    #[error("malformed response")]
    MalformedResponse,
    /// Timeout, connection failure, TLS failure or unexpected HTTP status
    #[error("network error")]
    NetworkError,
}

/// A failed attempt against one provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{provider}: {kind}: {message}")]
pub struct ProviderFailure {
    pub provider: String,
    pub kind: FailureKind,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(provider: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Errors surfaced to callers of [`crate::resolver::Resolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("text to translate is empty")]
    EmptyText,

    /// Both tiers failed; carries the most recent informative error
    #[error("all translation providers exhausted: {message}")]
    AllProvidersExhausted { message: String },
}

/// Failures of the persistent override and cache stores.
///
/// The resolver never propagates these: reads degrade to a miss and writes
/// are logged and dropped.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store contents are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("atomic write failed: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("background store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
