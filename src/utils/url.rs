// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

/// Characters that mail clients and plain-text digests leave glued to links.
/// A closing `)` is handled separately by `trim_artifacts`.
const TRAILING_ARTIFACTS: &[char] = &['>', '"', '\'', '.', ',', ';'];

/// Normalize an article URL so that every reference to the same article
/// yields the same string.
///
/// Drops the query string and fragment, lowercases scheme and host, strips
/// trailing punctuation picked up from text bodies and removes a trailing `/`
/// from non-root paths. Returns `None` for anything that is not http(s).
///
/// # Examples
/// ```
/// use curator::utils::url::normalize;
///
/// assert_eq!(
///     normalize("https://Medium.com/@a/post-0123456789ab?source=email#top").as_deref(),
///     Some("https://medium.com/@a/post-0123456789ab")
/// );
/// ```
pub fn normalize(raw: &str) -> Option<String> {
    let trimmed = trim_artifacts(raw.trim());
    let mut parsed = Url::parse(trimmed).ok()?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }

    parsed.set_query(None);
    parsed.set_fragment(None);

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    // A bare host keeps the single slash the parser inserts.
    Some(parsed.to_string())
}

/// Strip trailing punctuation. A `)` goes only when it is unbalanced, so
/// `/wiki/Foo_(bar)` keeps its parenthesis while `(see /post)` loses it.
fn trim_artifacts(mut value: &str) -> &str {
    loop {
        let stripped = value.trim_end_matches(TRAILING_ARTIFACTS);
        let unbalanced = stripped.ends_with(')')
            && stripped.matches(')').count() > stripped.matches('(').count();
        if unbalanced {
            value = &stripped[..stripped.len() - 1];
        } else {
            return stripped;
        }
    }
}

/// Whether a string parses as an http(s) URL.
pub fn is_http_url(raw: &str) -> bool {
    Url::parse(raw.trim())
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}
