// src/identity.rs

//! Identity extraction.
//!
//! Turns a [`RawArticle`] into an [`ArticleRecord`] with a stable identity.
//! The identity depends only on the item's GUID and link, never on when it
//! was fetched:
//!
//! 1. A non-empty GUID that is not itself a URL is used verbatim.
//! 2. Otherwise the normalized URL (GUID-as-URL first, then the link).
//!
//! Items that yield neither are dropped before they reach the sync engine.

use crate::error::{AppError, Result};
use crate::models::{ArticleIdentity, ArticleRecord, RawArticle};
use crate::utils::url::{is_http_url, normalize};

/// Derive the identity for a raw item.
pub fn extract_identity(raw: &RawArticle) -> Result<ArticleIdentity> {
    if let Some(guid) = raw.guid.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
        if !is_http_url(guid) {
            return Ok(ArticleIdentity::new(guid));
        }
        if let Some(url) = normalize(guid) {
            return Ok(ArticleIdentity::new(url));
        }
    }

    normalize(&raw.url).map(ArticleIdentity::new).ok_or_else(|| {
        AppError::identity(format!(
            "no usable guid or url for '{}' (url: '{}')",
            raw.title, raw.url
        ))
    })
}

/// Build a full record for a raw item.
pub fn extract(raw: RawArticle, source: &str) -> Result<ArticleRecord> {
    let identity = extract_identity(&raw)?;
    // GUID-only items still need a link for tickets and remote searches.
    let url = normalize(&raw.url).unwrap_or_else(|| identity.as_str().to_string());

    Ok(ArticleRecord {
        identity,
        title: clean_title(&raw.title),
        url,
        raw_url: raw.url,
        published: raw.published,
        source: source.to_string(),
        author: raw.author,
        categories: raw.categories,
        attachment: raw.attachment,
    })
}

/// Extract every item, dropping the malformed ones with a warning.
///
/// Returns the records plus the number of dropped items.
pub fn extract_all(raws: Vec<RawArticle>, source: &str) -> (Vec<ArticleRecord>, usize) {
    let mut records = Vec::with_capacity(raws.len());
    let mut dropped = 0;

    for raw in raws {
        match extract(raw, source) {
            Ok(record) => records.push(record),
            Err(e) => {
                dropped += 1;
                log::warn!("[{source}] Dropping item: {e}");
            }
        }
    }

    (records, dropped)
}

fn clean_title(raw: &str) -> String {
    let title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title
    }
}
