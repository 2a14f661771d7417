//! Supported provider families: their request shapes, language dialects
//! and the normalizer that pairs with each response schema.

use super::normalizer::{
    FlatFieldNormalizer, NestedSegmentsNormalizer, ResponseNormalizer, StatusEnvelopeNormalizer,
};
use super::ProviderRequest;
use crate::language::{is_traditional_chinese, primary};
use anyhow::{bail, Result};
use reqwest::Url;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Lingva front-end for Google Translate (`GET /api/v1/{sl}/{tl}/{q}`)
    Lingva,
    /// Google's public `translate_a/single?client=gtx` endpoint
    GoogleGtx,
    /// MyMemory (`GET /get?q=&langpair=sl|tl`)
    MyMemory,
    /// LibreTranslate (`POST /translate`)
    LibreTranslate,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Lingva,
        ProviderKind::GoogleGtx,
        ProviderKind::MyMemory,
        ProviderKind::LibreTranslate,
    ];

    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lingva" => Ok(ProviderKind::Lingva),
            "google" | "gtx" | "google_gtx" => Ok(ProviderKind::GoogleGtx),
            "mymemory" => Ok(ProviderKind::MyMemory),
            "libretranslate" | "libre" => Ok(ProviderKind::LibreTranslate),
            other => bail!("Unknown translation provider: '{}'", other),
        }
    }

    /// Name reported as the `source` of translations from this provider.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Lingva => "lingva",
            ProviderKind::GoogleGtx => "google",
            ProviderKind::MyMemory => "mymemory",
            ProviderKind::LibreTranslate => "libretranslate",
        }
    }

    /// Environment variable overriding the endpoint.
    pub fn endpoint_env(&self) -> &'static str {
        match self {
            ProviderKind::Lingva => "LINGVA_URL",
            ProviderKind::GoogleGtx => "GOOGLE_GTX_URL",
            ProviderKind::MyMemory => "MYMEMORY_URL",
            ProviderKind::LibreTranslate => "LIBRETRANSLATE_URL",
        }
    }

    /// Environment variable holding the optional credential.
    pub fn credential_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::MyMemory => Some("MYMEMORY_EMAIL"),
            ProviderKind::LibreTranslate => Some("LIBRETRANSLATE_API_KEY"),
            ProviderKind::Lingva | ProviderKind::GoogleGtx => None,
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ProviderKind::Lingva => "https://lingva.ml",
            ProviderKind::GoogleGtx => "https://translate.googleapis.com",
            ProviderKind::MyMemory => "https://api.mymemory.translated.net",
            ProviderKind::LibreTranslate => "https://libretranslate.com",
        }
    }

    pub fn normalizer(&self) -> Box<dyn ResponseNormalizer> {
        match self {
            ProviderKind::Lingva => Box::new(FlatFieldNormalizer {
                field: "translation",
            }),
            ProviderKind::GoogleGtx => Box::new(NestedSegmentsNormalizer),
            ProviderKind::MyMemory => Box::new(StatusEnvelopeNormalizer),
            ProviderKind::LibreTranslate => Box::new(FlatFieldNormalizer {
                field: "translatedText",
            }),
        }
    }

    /// Map a canonical language tag to this provider's dialect.
    pub fn language_code(&self, tag: &str) -> String {
        let lang = primary(tag);
        let traditional = is_traditional_chinese(tag);
        let code = match self {
            ProviderKind::Lingva if lang == "zh" && traditional => "zh_HANT",
            ProviderKind::GoogleGtx if lang == "zh" && traditional => "zh-TW",
            ProviderKind::GoogleGtx if lang == "zh" => "zh-CN",
            ProviderKind::LibreTranslate if lang == "zh" && traditional => "zt",
            ProviderKind::MyMemory => tag,
            _ => lang,
        };
        code.to_string()
    }

    /// Build the HTTP request for `request` against `endpoint`.
    pub fn build_request(
        &self,
        client: &reqwest::Client,
        endpoint: &str,
        credential: Option<&str>,
        request: &ProviderRequest,
    ) -> Result<reqwest::RequestBuilder> {
        let source = self.language_code(&request.source_lang);
        let target = self.language_code(&request.target_lang);
        let mut url = Url::parse(endpoint.trim_end_matches('/'))?;

        let builder = match self {
            ProviderKind::Lingva => {
                url.path_segments_mut()
                    .map_err(|_| anyhow::anyhow!("Endpoint cannot be a base URL: {}", endpoint))?
                    .pop_if_empty()
                    .extend(["api", "v1", source.as_str(), target.as_str(), request.text.as_str()]);
                client.get(url)
            }
            ProviderKind::GoogleGtx => {
                url.path_segments_mut()
                    .map_err(|_| anyhow::anyhow!("Endpoint cannot be a base URL: {}", endpoint))?
                    .pop_if_empty()
                    .extend(["translate_a", "single"]);
                url.query_pairs_mut()
                    .append_pair("client", "gtx")
                    .append_pair("sl", &source)
                    .append_pair("tl", &target)
                    .append_pair("dt", "t")
                    .append_pair("q", &request.text);
                client.get(url)
            }
            ProviderKind::MyMemory => {
                url.path_segments_mut()
                    .map_err(|_| anyhow::anyhow!("Endpoint cannot be a base URL: {}", endpoint))?
                    .pop_if_empty()
                    .push("get");
                {
                    let mut query = url.query_pairs_mut();
                    query
                        .append_pair("q", &request.text)
                        .append_pair("langpair", &format!("{}|{}", source, target));
                    if let Some(email) = credential {
                        query.append_pair("de", email);
                    }
                }
                client.get(url)
            }
            ProviderKind::LibreTranslate => {
                url.path_segments_mut()
                    .map_err(|_| anyhow::anyhow!("Endpoint cannot be a base URL: {}", endpoint))?
                    .pop_if_empty()
                    .push("translate");
                let mut body = json!({
                    "q": request.text,
                    "source": source,
                    "target": target,
                    "format": "text",
                });
                if let Some(key) = credential {
                    body["api_key"] = json!(key);
                }
                client.post(url).json(&body)
            }
        };

        Ok(builder)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
