//! HTTP front for the resolver.

use crate::anchor::{FileAnchor, FixedAnchor, FreshnessAnchor};
use crate::config::Config;
use crate::error::ResolveError;
use crate::metrics::MetricsReport;
use crate::overrides::OverrideTable;
use crate::resolver::{ResolveResponse, Resolver, TranslationRequest};
use crate::security::bearer_authorized;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
    /// Base directory `anchor_path` values are resolved against
    pub content_root: PathBuf,
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(resolver: Arc<Resolver>, config: &Config) -> Self {
        Self {
            resolver,
            content_root: PathBuf::from(&config.content_root),
            api_key: config.api_key.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TranslateBody {
    pub text: String,
    pub source: String,
    pub target: String,
    /// Content file (relative to the content root) whose edits invalidate
    /// the cached translation
    #[serde(default)]
    pub anchor_path: Option<String>,
    /// Caller-supplied last-modified time in Unix seconds
    #[serde(default)]
    pub anchor_modified_at: Option<i64>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/translate", post(translate))
        .route("/metrics", get(metrics))
        .route("/overrides", get(get_overrides).put(put_overrides))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind to the configured port and serve until Ctrl-C.
pub async fn serve(config: &Config, resolver: Arc<Resolver>) -> Result<()> {
    let state = AppState::new(resolver, config);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);
    if state.api_key.is_none() {
        warn!("API_KEY not set, /api routes are unauthenticated");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if !bearer_authorized(state.api_key.as_deref(), header) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ResolveResponse::failure("unauthorized")),
        )
            .into_response();
    }

    next.run(request).await
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn translate(
    State(state): State<AppState>,
    body: Result<Json<TranslateBody>, JsonRejection>,
) -> (StatusCode, Json<ResolveResponse>) {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return (
                rejection.status(),
                Json(ResolveResponse::failure(rejection.body_text())),
            )
        }
    };

    // A path anchor wins over a caller-supplied timestamp
    let anchor: Option<Arc<dyn FreshnessAnchor>> = match (&body.anchor_path, body.anchor_modified_at) {
        (Some(path), _) => match FileAnchor::within(&state.content_root, path) {
            Some(anchor) => Some(Arc::new(anchor)),
            None => {
                warn!("Rejected anchor path {:?}", path);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ResolveResponse::failure("invalid anchor_path")),
                );
            }
        },
        (None, Some(modified)) => Some(Arc::new(FixedAnchor(modified))),
        (None, None) => None,
    };

    let request = TranslationRequest {
        text: body.text,
        source_lang: body.source,
        target_lang: body.target,
        anchor,
    };

    let result = state.resolver.resolve(&request).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(ResolveError::EmptyText) => StatusCode::BAD_REQUEST,
        Err(ResolveError::AllProvidersExhausted { .. }) => StatusCode::BAD_GATEWAY,
    };

    (status, Json(ResolveResponse::from(&result)))
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsReport> {
    let report = state.resolver.metrics().report();
    info!("{}", report.format_log());
    Json(report)
}

async fn get_overrides(State(state): State<AppState>) -> Json<OverrideTable> {
    Json(state.resolver.overrides().get().await)
}

async fn put_overrides(
    State(state): State<AppState>,
    Json(table): Json<OverrideTable>,
) -> Result<Json<OverrideTable>, (StatusCode, Json<ResolveResponse>)> {
    let entries = table.len();
    state
        .resolver
        .overrides()
        .set(table.clone())
        .await
        .map_err(|e| {
            warn!("Failed to save overrides: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ResolveResponse::failure(format!(
                    "failed to save overrides: {}",
                    e
                ))),
            )
        })?;

    info!("Override table replaced ({} entries)", entries);
    Ok(Json(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FreshnessAwareCache, InMemoryCacheStore};
    use crate::error::FailureKind;
    use crate::overrides::InMemoryOverrideStore;
    use crate::providers::ProviderSet;
    use crate::testing::{FakeProvider, Reply};
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn state_with(provider: &Arc<FakeProvider>, api_key: Option<&str>, root: PathBuf) -> AppState {
        let resolver = Resolver::new(
            Arc::new(InMemoryOverrideStore::default()),
            FreshnessAwareCache::new(Arc::new(InMemoryCacheStore::new())),
            ProviderSet::new(vec![provider.shared()], 1),
        );
        AppState {
            resolver: Arc::new(resolver),
            content_root: root,
            api_key: api_key.map(str::to_string),
        }
    }

    fn post_json(uri: &str, body: serde_json::Value) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let provider = FakeProvider::new("p", Reply::success("Hello"));
        let app = router(state_with(&provider, Some("k"), PathBuf::from(".")));

        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_translate_success() {
        let provider = FakeProvider::new("lingva", Reply::success("Hello"));
        let app = router(state_with(&provider, None, PathBuf::from(".")));

        let response = app
            .oneshot(post_json(
                "/api/translate",
                serde_json::json!({"text": "你好", "source": "zh-TW", "target": "en"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["translated"], "Hello");
        assert_eq!(body["source"], "lingva");
        assert_eq!(body["cached"], false);
    }

    #[tokio::test]
    async fn test_translate_empty_text_is_bad_request() {
        let provider = FakeProvider::new("p", Reply::success("Hello"));
        let app = router(state_with(&provider, None, PathBuf::from(".")));

        let response = app
            .oneshot(post_json(
                "/api/translate",
                serde_json::json!({"text": "  ", "source": "zh-TW", "target": "en"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["ok"], false);
    }

    #[tokio::test]
    async fn test_translate_invalid_body_uses_failure_shape() {
        let provider = FakeProvider::new("p", Reply::success("Hello"));
        let app = router(state_with(&provider, None, PathBuf::from(".")));

        let response = app
            .oneshot(post_json(
                "/api/translate",
                serde_json::json!({"text": "你好", "source": "zh-TW"}),
            ))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        let body = json_body(response).await;
        assert_eq!(body["ok"], false);
        assert!(body["error"].as_str().unwrap().contains("target"));
        assert_eq!(provider.started(), 0);
    }

    #[tokio::test]
    async fn test_translate_exhausted_is_bad_gateway() {
        let provider = FakeProvider::new("p", Reply::failure(FailureKind::RateLimited));
        let app = router(state_with(&provider, None, PathBuf::from(".")));

        let response = app
            .oneshot(post_json(
                "/api/translate",
                serde_json::json!({"text": "你好", "source": "zh-TW", "target": "en"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_translate_rejects_escaping_anchor() {
        let dir = TempDir::new().unwrap();
        let provider = FakeProvider::new("p", Reply::success("Hello"));
        let app = router(state_with(&provider, None, dir.path().to_path_buf()));

        let response = app
            .oneshot(post_json(
                "/api/translate",
                serde_json::json!({
                    "text": "你好",
                    "source": "zh-TW",
                    "target": "en",
                    "anchor_path": "../secrets.md"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(provider.started(), 0);
    }

    #[tokio::test]
    async fn test_api_requires_bearer_key() {
        let provider = FakeProvider::new("p", Reply::success("Hello"));
        let state = state_with(&provider, Some("s3cret"), PathBuf::from("."));

        let denied = router(state.clone())
            .oneshot(HttpRequest::get("/api/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = router(state)
            .oneshot(
                HttpRequest::get("/api/metrics")
                    .header(header::AUTHORIZATION, "Bearer s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        assert!(json_body(allowed).await.get("cache_hits").is_some());
    }

    #[tokio::test]
    async fn test_overrides_put_then_get() {
        let provider = FakeProvider::new("p", Reply::success("Hello"));
        let state = state_with(&provider, None, PathBuf::from("."));

        let put = HttpRequest::builder()
            .method("PUT")
            .uri("/api/overrides")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({"en": {"你好": "Hi there"}}).to_string(),
            ))
            .unwrap();
        let response = router(state.clone()).oneshot(put).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router(state.clone())
            .oneshot(HttpRequest::get("/api/overrides").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["en"]["你好"], "Hi there");

        let response = router(state)
            .oneshot(post_json(
                "/api/translate",
                serde_json::json!({"text": "你好", "source": "zh-TW", "target": "en"}),
            ))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["translated"], "Hi there");
        assert_eq!(body["source"], "wording");
        assert_eq!(provider.started(), 0);
    }
}
