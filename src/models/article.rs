//! Article data structures.

use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable deduplication key for an article: a normalized URL or a feed GUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleIdentity(String);

impl ArticleIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ArticleIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ArticleIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// An item as discovered by a source, before identity extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawArticle {
    /// Title as published (already entity-decoded)
    pub title: String,

    /// Link to the article, possibly carrying tracking parameters
    pub url: String,

    /// Feed GUID when the source provides one
    pub guid: Option<String>,

    pub published: Option<DateTime<Utc>>,

    pub author: Option<String>,

    pub categories: Vec<String>,

    /// Full HTML content if the feed embeds it
    pub content: Option<String>,

    /// Local file to archive alongside the ticket (e.g. a captured PDF)
    pub attachment: Option<PathBuf>,
}

/// A discovered article with its identity resolved. Lives for one run only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    pub identity: ArticleIdentity,

    pub title: String,

    /// Normalized article URL
    pub url: String,

    /// URL exactly as the source delivered it
    pub raw_url: String,

    pub published: Option<DateTime<Utc>>,

    /// Name of the source that produced this record
    pub source: String,

    pub author: Option<String>,

    pub categories: Vec<String>,

    pub attachment: Option<PathBuf>,
}

impl ArticleRecord {
    /// Render a ticket body from a template.
    ///
    /// Supported placeholders:
    /// - `{title}`, `{url}`, `{published}`, `{source}`
    /// - `{author}`, `{categories}`, `{archive_link}`
    pub fn render(&self, template: &str, archive_link: Option<&str>) -> String {
        let published = self
            .published
            .map(|p| p.to_rfc3339())
            .unwrap_or_else(|| "Unknown".to_string());
        let categories = if self.categories.is_empty() {
            "None".to_string()
        } else {
            self.categories.join(", ")
        };

        template
            .replace("{title}", &self.title)
            .replace("{url}", &self.url)
            .replace("{published}", &published)
            .replace("{source}", &self.source)
            .replace("{author}", self.author.as_deref().unwrap_or("Unknown"))
            .replace("{categories}", &categories)
            .replace("{archive_link}", archive_link.unwrap_or("Not archived"))
    }

    /// Short form used in log lines and the run summary.
    pub fn short_title(&self) -> String {
        const MAX: usize = 60;
        if self.title.chars().count() <= MAX {
            self.title.clone()
        } else {
            let cut: String = self.title.chars().take(MAX).collect();
            format!("{cut}...")
        }
    }
}
