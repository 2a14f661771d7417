//! Language tag handling.
//!
//! Callers pass whatever tag their content uses (`zh_tw`, `ZH-TW`, `en`).
//! Every comparison inside the engine (identity check, override lookup,
//! cache key) runs on the canonical form produced by [`canonicalize`].

/// Canonicalize a BCP 47-ish language tag.
///
/// - `_` separators become `-`
/// - the primary subtag is lowercased
/// - 2-letter or 3-digit region subtags are uppercased
/// - 4-letter script subtags are title-cased
///
/// # Example
/// ```
/// use translation_resolver::language::canonicalize;
///
/// assert_eq!(canonicalize("zh_tw"), "zh-TW");
/// assert_eq!(canonicalize("ZH-hant"), "zh-Hant");
/// ```
pub fn canonicalize(tag: &str) -> String {
    tag.trim()
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .enumerate()
        .map(|(i, part)| {
            if i == 0 {
                part.to_ascii_lowercase()
            } else if part.len() == 4 && part.chars().all(|c| c.is_ascii_alphabetic()) {
                let mut chars = part.chars();
                let first = chars.next().map(|c| c.to_ascii_uppercase());
                first
                    .into_iter()
                    .chain(chars.map(|c| c.to_ascii_lowercase()))
                    .collect()
            } else if part.len() == 2 || (part.len() == 3 && part.chars().all(|c| c.is_ascii_digit())) {
                part.to_ascii_uppercase()
            } else {
                part.to_ascii_lowercase()
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Primary language subtag of a canonical tag (`zh-TW` -> `zh`).
pub fn primary(tag: &str) -> &str {
    tag.split('-').next().unwrap_or(tag)
}

/// Whether a canonical Chinese tag denotes the Traditional script.
pub fn is_traditional_chinese(tag: &str) -> bool {
    primary(tag) == "zh"
        && tag
            .split('-')
            .skip(1)
            .any(|part| matches!(part, "TW" | "HK" | "MO" | "Hant"))
}
