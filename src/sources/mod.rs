//! Article sources.
//!
//! Each source turns some external input into [`RawArticle`]s and hands them
//! to the identity extractor:
//! - `rss`: a feed fetched over HTTP
//! - `email`: a saved digest email (`.eml`)
//! - `scraped`: a JSON file written by an external scraper

pub mod email;
pub mod rss;
pub mod scraped;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::identity;
use crate::models::{ArticleRecord, HttpConfig, RawArticle, SourceConfig, SourceKind};

pub use email::EmailDigestSource;
pub use rss::RssSource;
pub use scraped::ScrapedSource;

/// Candidates produced by one fetch.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<ArticleRecord>,
    /// Items without a usable identity
    pub dropped: usize,
    /// Video-only entries filtered out
    pub skipped_video: usize,
}

impl FetchOutcome {
    /// Run identity extraction over raw items.
    pub fn from_raw(raws: Vec<RawArticle>, source: &str) -> Self {
        let (records, dropped) = identity::extract_all(raws, source);
        Self {
            records,
            dropped,
            skipped_video: 0,
        }
    }
}

/// Trait for anything that can list candidate articles.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Display name, used as the record's source tag.
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<FetchOutcome>;
}

/// Inputs a source may need besides its configuration.
#[derive(Debug, Clone, Default)]
pub struct SourceInputs {
    /// `.eml` or scraped JSON file
    pub input: Option<PathBuf>,
    /// Directory with `NN-title.pdf` captures for email digests
    pub attachments: Option<PathBuf>,
}

/// Build the source adapter for a configured source.
pub fn build_source(
    source: &SourceConfig,
    http: &HttpConfig,
    inputs: SourceInputs,
) -> Result<Box<dyn ArticleSource>> {
    let name = source.display_name().to_string();

    match source.kind {
        SourceKind::Rss => {
            let feed_url = source.feed_url.clone().ok_or_else(|| {
                AppError::config(format!("rss source '{}' has no feed_url", source.name))
            })?;
            Ok(Box::new(RssSource::new(name, feed_url, http, source.skip_video)?))
        }
        SourceKind::Email => {
            let input = require_input(source, inputs.input.as_deref())?;
            let mut digest = EmailDigestSource::new(name, input);
            if let Some(dir) = inputs.attachments {
                digest = digest.with_attachments(dir);
            }
            Ok(Box::new(digest))
        }
        SourceKind::Scraped => {
            let input = require_input(source, inputs.input.as_deref())?;
            Ok(Box::new(ScrapedSource::new(name, input)))
        }
    }
}

fn require_input(source: &SourceConfig, input: Option<&Path>) -> Result<PathBuf> {
    input.map(Path::to_path_buf).ok_or_else(|| {
        AppError::config(format!(
            "source '{}' ({:?}) needs an --input file",
            source.name, source.kind
        ))
    })
}
