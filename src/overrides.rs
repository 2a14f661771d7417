//! Administrator overrides ("wording").
//!
//! Overrides run before the cache and the providers. An exact match on the
//! whole text short-circuits the resolve; otherwise every configured key
//! found inside the text is substituted and the mutated text is what gets
//! cached and sent to providers.

use crate::error::StoreError;
use crate::language::canonicalize;
use async_trait::async_trait;
use regex::{Captures, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Target language -> (source key -> replacement).
///
/// Keys and values are trimmed and empty entries are dropped on
/// construction, so every stored pair is usable as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, BTreeMap<String, String>>")]
#[serde(into = "BTreeMap<String, BTreeMap<String, String>>")]
pub struct OverrideTable {
    entries: BTreeMap<String, BTreeMap<String, String>>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one override. Empty keys or values are ignored.
    pub fn insert(&mut self, target_lang: &str, key: &str, value: &str) {
        let lang = canonicalize(target_lang);
        let key = key.trim();
        let value = value.trim();
        if lang.is_empty() || key.is_empty() || value.is_empty() {
            return;
        }
        self.entries
            .entry(lang)
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Overrides configured for a (canonical) target language.
    pub fn for_language(&self, target_lang: &str) -> Option<&BTreeMap<String, String>> {
        self.entries.get(target_lang)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of key/value pairs across all languages.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }
}

impl From<BTreeMap<String, BTreeMap<String, String>>> for OverrideTable {
    fn from(raw: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        let mut table = OverrideTable::new();
        for (lang, pairs) in raw {
            for (key, value) in pairs {
                table.insert(&lang, &key, &value);
            }
        }
        table
    }
}

impl From<OverrideTable> for BTreeMap<String, BTreeMap<String, String>> {
    fn from(table: OverrideTable) -> Self {
        table.entries
    }
}

/// Result of applying overrides to a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideOutcome {
    /// An exact override matched; no further step may run
    pub short_circuit: bool,
    /// Text after partial substitution (unchanged on exact match)
    pub final_text: String,
    /// The exact override value when `short_circuit` is set
    pub result: Option<String>,
}

/// Apply overrides for `target_lang` (canonical) to `text`.
///
/// Never fails: a missing table or no matching keys leaves the text alone.
pub fn apply(text: &str, target_lang: &str, table: &OverrideTable) -> OverrideOutcome {
    let Some(pairs) = table.for_language(target_lang) else {
        return OverrideOutcome {
            short_circuit: false,
            final_text: text.to_string(),
            result: None,
        };
    };

    if let Some(value) = pairs.get(text.trim()) {
        return OverrideOutcome {
            short_circuit: true,
            final_text: text.to_string(),
            result: Some(value.clone()),
        };
    }

    // Longest key first so a short key cannot break up a longer one that
    // overlaps it.
    let mut keys: Vec<(&String, &String)> = pairs.iter().collect();
    keys.sort_by(|(a, _), (b, _)| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });

    let final_text = substitute(text, &keys);
    if final_text != text {
        debug!("Partial overrides rewrote text for {}", target_lang);
    }

    OverrideOutcome {
        short_circuit: false,
        final_text,
        result: None,
    }
}

/// Replace every key in a single left-to-right pass over `text`. Each key
/// only matches the original text, never a value inserted for another key.
fn substitute(text: &str, keys: &[(&String, &String)]) -> String {
    if keys.is_empty() {
        return text.to_string();
    }

    let alternation = keys
        .iter()
        .map(|(key, _)| format!("({})", key_pattern(key)))
        .collect::<Vec<_>>()
        .join("|");

    let re = match RegexBuilder::new(&alternation).case_insensitive(true).build() {
        Ok(re) => re,
        Err(e) => {
            warn!("Skipping partial overrides: {}", e);
            return text.to_string();
        }
    };

    re.replace_all(text, |caps: &Captures| {
        (1..caps.len())
            .find(|&group| caps.get(group).is_some())
            .map(|group| keys[group - 1].1.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

/// CJK keys match literally and case-sensitively. Other keys match
/// case-insensitively, bounded by `\b` on whichever edges are word
/// characters.
fn key_pattern(key: &str) -> String {
    if contains_cjk(key) {
        return format!("(?-i:{})", regex::escape(key));
    }

    let starts_word = key.chars().next().is_some_and(is_word_char);
    let ends_word = key.chars().last().is_some_and(is_word_char);
    format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        regex::escape(key),
        if ends_word { r"\b" } else { "" },
    )
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether any codepoint falls in the common CJK, Kana or Hangul ranges.
pub fn contains_cjk(s: &str) -> bool {
    s.chars().any(|c| {
        matches!(c as u32,
            0x1100..=0x11FF      // Hangul Jamo
            | 0x3040..=0x30FF    // Hiragana, Katakana
            | 0x3130..=0x318F    // Hangul compatibility Jamo
            | 0x3400..=0x4DBF    // CJK extension A
            | 0x4E00..=0x9FFF    // CJK unified ideographs
            | 0xAC00..=0xD7AF    // Hangul syllables
            | 0xF900..=0xFAFF    // CJK compatibility ideographs
            | 0xFF66..=0xFF9F    // Half-width Katakana
            | 0x20000..=0x2A6DF) // CJK extension B
    })
}

/// Source of the administrator override table.
#[async_trait]
pub trait OverrideStore: Send + Sync {
    async fn get(&self) -> OverrideTable;
    async fn set(&self, table: OverrideTable) -> Result<(), StoreError>;
}

/// Override table held in memory. Used by tests and by embedders that
/// manage persistence themselves.
#[derive(Debug, Default)]
pub struct InMemoryOverrideStore {
    table: RwLock<OverrideTable>,
}

impl InMemoryOverrideStore {
    pub fn new(table: OverrideTable) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }
}

#[async_trait]
impl OverrideStore for InMemoryOverrideStore {
    async fn get(&self) -> OverrideTable {
        self.table.read().await.clone()
    }

    async fn set(&self, table: OverrideTable) -> Result<(), StoreError> {
        *self.table.write().await = table;
        Ok(())
    }
}

/// Override table persisted as a JSON document:
/// `{ "en": { "你好": "Hi there" } }`.
#[derive(Debug, Clone)]
pub struct JsonFileOverrideStore {
    path: PathBuf,
}

impl JsonFileOverrideStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<OverrideTable, StoreError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl OverrideStore for JsonFileOverrideStore {
    async fn get(&self) -> OverrideTable {
        match self.read().await {
            Ok(table) => table,
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                OverrideTable::new()
            }
            Err(e) => {
                warn!(
                    "Failed to read overrides from {}: {}",
                    self.path.display(),
                    e
                );
                OverrideTable::new()
            }
        }
    }

    async fn set(&self, table: OverrideTable) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(&table)?;
        crate::cache::write_atomic(self.path.clone(), content).await
    }
}
