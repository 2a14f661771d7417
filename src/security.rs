use subtle::ConstantTimeEq;

/// Constant-time string comparison to prevent timing attacks
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Check an `Authorization` header value against the configured API key.
///
/// With no key configured every request is authorized. Otherwise the header
/// must be `Bearer <key>`.
pub fn bearer_authorized(expected: Option<&str>, header: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| constant_time_compare(token.trim(), expected))
        .unwrap_or(false)
}
