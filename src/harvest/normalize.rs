//! Identity-URL normalization.
//!
//! Document ids downstream are keyed off these strings, so two links to the
//! same post must normalize identically across scrapes: tracking parameters
//! and parameter ordering must not change the result.

use url::Url;
use xxhash_rust::xxh3::xxh3_64;

use super::selectors::IDENTITY_QUERY_KEYS;

/// Canonicalize a raw (possibly relative) link into a stable identity string.
///
/// Resolves against `base`, keeps only the allow-listed identity query keys
/// (sorted), drops every other parameter and the fragment, and strips a
/// trailing slash from the path. Returns `None` when the link cannot be
/// parsed as a URL; the caller treats that as "no permalink" and falls back
/// to a synthetic identity.
pub fn normalize_feed_url(raw: &str, base: &str) -> Option<String> {
    let base_url = Url::parse(base).ok()?;
    let absolute = base_url.join(raw).ok()?;

    // First value wins per key, matching typical duplicate-param handling.
    let mut kept: Vec<(String, String)> = Vec::new();
    for key in IDENTITY_QUERY_KEYS {
        if let Some((_, value)) = absolute
            .query_pairs()
            .find(|(k, v)| k == key && !v.is_empty())
        {
            kept.push(((*key).to_string(), value.into_owned()));
        }
    }
    kept.sort();

    let scheme = absolute.scheme();
    let host = absolute.host_str()?;
    let path = absolute.path().trim_end_matches('/');

    let port = match absolute.port() {
        Some(p) => format!(":{p}"),
        None => String::new(),
    };

    if kept.is_empty() {
        Some(format!("{scheme}://{host}{port}{path}"))
    } else {
        let query = kept
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        Some(format!("{scheme}://{host}{port}{path}?{query}"))
    }
}

/// Build a stable synthetic identity when no permalink resolves.
///
/// The same (base, trimmed text, position) triple always maps to the same
/// identity within a run. No stability across runs is implied: position in a
/// virtualized feed is not a durable key.
pub fn synthetic_content_url(base: &str, raw_text: &str, index: usize) -> String {
    let seed = format!("{base}|{}|{index}", raw_text.trim());
    let digest = xxh3_64(seed.as_bytes());
    format!("{}#content-{digest:016x}", base.trim_end_matches('/'))
}
