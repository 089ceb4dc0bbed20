//! Log-safe header summaries.

use axum::http::HeaderMap;

use portico_auth::credential::fingerprint;

/// Headers whose values are replaced by a fingerprint.
const SENSITIVE: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "proxy-authorization",
    "userdetails",
];

const MAX_VALUE_LEN: usize = 64;
const MAX_HEADERS: usize = 24;

/// Render headers as `name=value` pairs with credentials redacted and long
/// values truncated.
#[must_use]
pub fn header_summary(headers: &HeaderMap) -> String {
    let mut parts: Vec<String> = headers
        .iter()
        .take(MAX_HEADERS)
        .map(|(name, value)| {
            let value = value.to_str().unwrap_or("<binary>");
            let shown = if SENSITIVE.contains(&name.as_str()) {
                fingerprint(value)
            } else {
                truncate(value)
            };
            format!("{name}={shown}")
        })
        .collect();

    if headers.len() > MAX_HEADERS {
        parts.push(format!("…(+{})", headers.len() - MAX_HEADERS));
    }
    parts.join(", ")
}

fn truncate(value: &str) -> String {
    if value.chars().count() <= MAX_VALUE_LEN {
        value.to_string()
    } else {
        let head: String = value.chars().take(MAX_VALUE_LEN).collect();
        format!("{head}…")
    }
}
