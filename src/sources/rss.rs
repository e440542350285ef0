// src/sources/rss.rs

//! RSS 2.0 feed source.
//!
//! Reads `<item>` elements:
//!
//! | element           | field                                 |
//! |-------------------|---------------------------------------|
//! | `title`           | title (entity-decoded)                |
//! | `link`            | url                                   |
//! | `guid`            | guid                                  |
//! | `pubDate`         | published (RFC 2822, converted to UTC)|
//! | `dc:creator`      | author (`author` as fallback)         |
//! | `category`        | categories                            |
//! | `content:encoded` | content (`description` as fallback)   |

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use reqwest::Client;
use scraper::Html;

use crate::error::{AppError, Result};
use crate::models::{HttpConfig, RawArticle};
use crate::sources::{ArticleSource, FetchOutcome};
use crate::utils::http::{create_client, fetch_text};

const VIDEO_PATTERNS: &[&str] = &[
    r"<iframe[^>]+youtube\.com/embed/",
    r"<iframe[^>]+youtube-nocookie\.com/embed/",
    r"https://www\.youtube\.com/watch",
];

static VIDEO_REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();

/// Feed fetched over HTTP.
pub struct RssSource {
    name: String,
    feed_url: String,
    client: Client,
    skip_video: bool,
}

impl RssSource {
    pub fn new(
        name: impl Into<String>,
        feed_url: impl Into<String>,
        http: &HttpConfig,
        skip_video: bool,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            feed_url: feed_url.into(),
            client: create_client(http)?,
            skip_video,
        })
    }
}

#[async_trait]
impl ArticleSource for RssSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        log::info!("Fetching feed {}", self.feed_url);
        let xml = fetch_text(&self.client, &self.feed_url)
            .await
            .map_err(|e| AppError::source(&self.name, e))?;

        let items = parse_feed(&xml).map_err(|e| AppError::source(&self.name, e))?;
        log::info!("Feed returned {} items", items.len());

        let (items, skipped_video) = if self.skip_video {
            filter_videos(items)
        } else {
            (items, 0)
        };
        if skipped_video > 0 {
            log::info!("Skipping {skipped_video} video item(s)");
        }

        Ok(FetchOutcome {
            skipped_video,
            ..FetchOutcome::from_raw(items, &self.name)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Guid,
    PubDate,
    Creator,
    Author,
    Category,
    Content,
    Description,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"guid" => Some(Field::Guid),
            b"pubDate" => Some(Field::PubDate),
            b"dc:creator" => Some(Field::Creator),
            b"author" => Some(Field::Author),
            b"category" => Some(Field::Category),
            b"content:encoded" => Some(Field::Content),
            b"description" => Some(Field::Description),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct ItemBuilder {
    raw: RawArticle,
    author_fallback: Option<String>,
    description: Option<String>,
}

impl ItemBuilder {
    fn set(&mut self, field: Field, value: String) {
        let value = value.trim().to_string();
        match field {
            Field::Title => self.raw.title = decode_entities(&value),
            Field::Link => self.raw.url = value,
            Field::Guid => self.raw.guid = Some(value).filter(|v| !v.is_empty()),
            Field::PubDate => self.raw.published = parse_pub_date(&value),
            Field::Creator => self.raw.author = Some(value).filter(|v| !v.is_empty()),
            Field::Author => self.author_fallback = Some(value).filter(|v| !v.is_empty()),
            Field::Category => {
                if !value.is_empty() {
                    self.raw.categories.push(decode_entities(&value));
                }
            }
            Field::Content => self.raw.content = Some(value),
            Field::Description => self.description = Some(value),
        }
    }

    fn finish(self) -> RawArticle {
        let mut raw = self.raw;
        if raw.author.is_none() {
            raw.author = self.author_fallback;
        }
        if raw.content.is_none() {
            raw.content = self.description;
        }
        if raw.guid.is_none() && !raw.url.is_empty() {
            raw.guid = Some(raw.url.clone());
        }
        raw
    }
}

/// Parse the `<item>` elements of an RSS document.
pub fn parse_feed(xml: &str) -> Result<Vec<RawArticle>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<ItemBuilder> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                if name.as_ref() == b"item" {
                    current = Some(ItemBuilder::default());
                } else if current.is_some() && field.is_none() {
                    field = Field::from_tag(name.as_ref());
                    text.clear();
                }
            }
            Event::Text(t) if field.is_some() => match t.unescape() {
                Ok(s) => text.push_str(&s),
                Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
            },
            Event::CData(c) if field.is_some() => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Event::End(e) => {
                let name = e.name();
                if name.as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        items.push(item.finish());
                    }
                    field = None;
                } else if let (Some(f), Some(item)) = (field, current.as_mut()) {
                    if Field::from_tag(name.as_ref()) == Some(f) {
                        item.set(f, std::mem::take(&mut text));
                        field = None;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

/// Whether HTML content embeds a YouTube player.
pub fn is_video_content(html: &str) -> bool {
    VIDEO_REGEXES
        .get_or_init(|| {
            VIDEO_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect()
        })
        .iter()
        .any(|re| re.is_match(html))
}

fn filter_videos(items: Vec<RawArticle>) -> (Vec<RawArticle>, usize) {
    let before = items.len();
    let kept: Vec<RawArticle> = items
        .into_iter()
        .filter(|item| {
            let video = item.content.as_deref().is_some_and(is_video_content);
            if video {
                log::debug!("Video item: {}", item.title);
            }
            !video
        })
        .collect();
    let skipped = before - kept.len();
    (kept, skipped)
}

fn parse_pub_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Decode HTML entities left in feed text (`&#8217;`, `&amp;`).
fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    let fragment = Html::parse_fragment(value);
    fragment.root_element().text().collect::<String>()
}
