//! Per-provider response schemas mapped to one canonical string.
//!
//! This is the only place that knows what a provider's payload looks like.
//! Everything upstream sees either a trimmed, non-empty translation or a
//! classified failure.

use crate::error::FailureKind;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NormalizeError {
    pub kind: FailureKind,
    pub message: String,
}

impl NormalizeError {
    fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::MalformedResponse,
            message: message.into(),
        }
    }
}

pub trait ResponseNormalizer: std::fmt::Debug + Send + Sync {
    /// Extract the translated text from a successful (2xx) response body.
    fn normalize(&self, body: &str) -> Result<String, NormalizeError>;
}

fn parse_json(body: &str) -> Result<Value, NormalizeError> {
    serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(80).collect();
        NormalizeError::malformed(format!("response is not JSON ({}): {:?}", e, preview))
    })
}

fn non_empty(text: &str, field: &str) -> Result<String, NormalizeError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::malformed(format!("`{}` is empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Flat object with the translation under a single field, e.g.
/// `{"translatedText": "Hello"}`.
#[derive(Debug, Clone, Copy)]
pub struct FlatFieldNormalizer {
    pub field: &'static str,
}

impl ResponseNormalizer for FlatFieldNormalizer {
    fn normalize(&self, body: &str) -> Result<String, NormalizeError> {
        let value = parse_json(body)?;
        if let Some(text) = value.get(self.field).and_then(Value::as_str) {
            return non_empty(text, self.field);
        }
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return Err(NormalizeError::malformed(format!("provider error: {}", error)));
        }
        Err(NormalizeError::malformed(format!(
            "missing `{}` field",
            self.field
        )))
    }
}

/// Status-qualified envelope:
/// `{"responseStatus": 200, "responseData": {"translatedText": "Hello"}}`.
///
/// The envelope can report failure with an HTTP 200, so the inner status is
/// classified here.
#[derive(Debug, Clone, Copy)]
pub struct StatusEnvelopeNormalizer;

const QUOTA_WARNING_PREFIX: &str = "MYMEMORY WARNING";

impl ResponseNormalizer for StatusEnvelopeNormalizer {
    fn normalize(&self, body: &str) -> Result<String, NormalizeError> {
        let value = parse_json(body)?;

        // Status arrives as either a number or a numeric string.
        let status = match value.get("responseStatus") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        let details = value
            .get("responseDetails")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let quota_finished = value
            .get("quotaFinished")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if quota_finished {
            return Err(NormalizeError {
                kind: FailureKind::RateLimited,
                message: "quota finished".to_string(),
            });
        }

        match status {
            Some(200) => {}
            Some(429) => {
                return Err(NormalizeError {
                    kind: FailureKind::RateLimited,
                    message: format!("envelope status 429: {}", details),
                })
            }
            Some(code @ (401 | 403)) => {
                return Err(NormalizeError {
                    kind: FailureKind::AuthRequired,
                    message: format!("envelope status {}: {}", code, details),
                })
            }
            Some(code) => {
                return Err(NormalizeError::malformed(format!(
                    "envelope status {}: {}",
                    code, details
                )))
            }
            None => return Err(NormalizeError::malformed("missing `responseStatus`")),
        }

        let text = value
            .get("responseData")
            .and_then(|data| data.get("translatedText"))
            .and_then(Value::as_str)
            .ok_or_else(|| NormalizeError::malformed("missing `responseData.translatedText`"))?;

        if text.trim_start().starts_with(QUOTA_WARNING_PREFIX) {
            return Err(NormalizeError {
                kind: FailureKind::RateLimited,
                message: text.trim().to_string(),
            });
        }

        non_empty(text, "responseData.translatedText")
    }
}

/// Nested segment arrays: `[[["Hel", "src", ...], ["lo", "src", ...]], ...]`.
/// Segments are joined in order.
#[derive(Debug, Clone, Copy)]
pub struct NestedSegmentsNormalizer;

impl ResponseNormalizer for NestedSegmentsNormalizer {
    fn normalize(&self, body: &str) -> Result<String, NormalizeError> {
        let value = parse_json(body)?;
        let segments = value
            .get(0)
            .and_then(Value::as_array)
            .ok_or_else(|| NormalizeError::malformed("missing segment list"))?;

        let joined: String = segments
            .iter()
            .filter_map(|segment| segment.get(0).and_then(Value::as_str))
            .collect();

        non_empty(&joined, "segments")
    }
}
