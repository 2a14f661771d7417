use crate::providers::{ProviderKind, ProviderSettings, Timeouts};
use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::time::Duration;

const DEFAULT_PROVIDERS: &str = "lingva,google,mymemory,libretranslate";

#[derive(Debug, Clone)]
pub struct Config {
    // Providers, in priority order
    pub providers: Vec<ProviderSettings>,
    pub race_size: usize,
    pub timeouts: Timeouts,

    // Storage
    pub cache_dir: String,
    pub cache_ttl_secs: Option<u64>,
    pub overrides_file: String,
    pub content_root: String,

    // Server
    pub api_key: Option<String>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let provider_list =
            std::env::var("TRANSLATE_PROVIDERS").unwrap_or_else(|_| DEFAULT_PROVIDERS.to_string());

        let providers = provider_list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|name| {
                let kind = ProviderKind::from_name(name)?;
                let endpoint = std::env::var(kind.endpoint_env())
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| kind.default_endpoint().to_string());
                let credential = kind
                    .credential_env()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|v| !v.trim().is_empty());
                Ok(ProviderSettings::new(kind)
                    .with_endpoint(endpoint)
                    .with_credential(credential))
            })
            .collect::<Result<Vec<_>>>()
            .context("Invalid TRANSLATE_PROVIDERS")?;

        let config = Self {
            providers,
            race_size: parse_var("TRANSLATE_RACE_SIZE")?.unwrap_or(2),
            timeouts: Timeouts {
                connect: Duration::from_millis(
                    parse_var("TRANSLATE_CONNECT_TIMEOUT_MS")?.unwrap_or(3000),
                ),
                request: Duration::from_millis(
                    parse_var("TRANSLATE_REQUEST_TIMEOUT_MS")?.unwrap_or(8000),
                ),
            },

            cache_dir: std::env::var("TRANSLATE_CACHE_DIR")
                .unwrap_or_else(|_| "data/translation-cache".to_string()),
            cache_ttl_secs: parse_var("TRANSLATE_CACHE_TTL_SECS")?,
            overrides_file: std::env::var("TRANSLATE_OVERRIDES_FILE")
                .unwrap_or_else(|_| "data/wording.json".to_string()),
            content_root: std::env::var("CONTENT_ROOT").unwrap_or_else(|_| "content".to_string()),

            api_key: std::env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            port: parse_var("PORT")?.unwrap_or(8080),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            bail!("TRANSLATE_PROVIDERS must name at least one provider");
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.kind) {
                bail!("Provider '{}' is listed more than once", provider.kind);
            }
        }

        if self.timeouts.connect.is_zero() || self.timeouts.request.is_zero() {
            bail!("Provider timeouts must be greater than zero");
        }
        if self.timeouts.request <= self.timeouts.connect {
            bail!(
                "TRANSLATE_REQUEST_TIMEOUT_MS ({:?}) must exceed TRANSLATE_CONNECT_TIMEOUT_MS ({:?})",
                self.timeouts.request,
                self.timeouts.connect
            );
        }

        Ok(())
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}

/// Parse an optional environment variable; a present but unparsable value
/// is an error rather than a silent default.
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", name, raw, e)),
        _ => Ok(None),
    }
}
