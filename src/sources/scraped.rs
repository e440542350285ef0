// src/sources/scraped.rs

//! Scraped listing source.
//!
//! Reads a JSON array written by an external page scraper:
//!
//! ```json
//! [
//!   { "title": "...", "url": "https://...", "date": "2026-01-31",
//!     "author": "...", "pdf": "/captures/01-post.pdf" }
//! ]
//! ```
//!
//! Only `url` is required. `date` accepts RFC 3339, `YYYY-MM-DD` or
//! `Mon DD, YYYY`; anything else is kept as unknown.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::RawArticle;
use crate::sources::{ArticleSource, FetchOutcome};

/// Listing produced by a scraper run.
pub struct ScrapedSource {
    name: String,
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ScrapedItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    pdf: Option<PathBuf>,
}

impl From<ScrapedItem> for RawArticle {
    fn from(item: ScrapedItem) -> Self {
        RawArticle {
            title: item.title,
            url: item.url,
            published: item.date.as_deref().and_then(parse_date),
            author: item.author.filter(|a| !a.trim().is_empty()),
            attachment: item.pdf,
            ..RawArticle::default()
        }
    }
}

impl ScrapedSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl ArticleSource for ScrapedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        log::info!("Reading scraped listing {}", self.path.display());
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| AppError::source(&self.name, format!("{}: {e}", self.path.display())))?;
        let items: Vec<ScrapedItem> =
            serde_json::from_slice(&bytes).map_err(|e| AppError::source(&self.name, e))?;

        let raws = items.into_iter().map(RawArticle::from).collect();
        Ok(FetchOutcome::from_raw(raws, &self.name))
    }
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
