// src/sources/email.rs

//! Daily digest email source.
//!
//! Reads a saved `.eml` message, walks its MIME tree and collects Medium
//! article links in document order. `text/html` parts are searched through
//! their anchors, `text/plain` parts with a URL pattern. Bodies encoded as
//! base64 or quoted-printable are decoded first.
//!
//! Digests carry no titles we can trust, so titles come from the URL slug.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::RawArticle;
use crate::sources::{ArticleSource, FetchOutcome};

/// `https://medium.com/{@user | publication}/{slug}-{12 hex id}`
const MEDIUM_ARTICLE: &str =
    r"^https://medium\.com/(@?[A-Za-z0-9_.-]+)/([A-Za-z0-9_-]+-[a-f0-9]{12})(?:[/?#]|$)";

/// First path segments that never hold articles.
const EXCLUDED_SECTIONS: &[&str] = &[
    "plans",
    "jobs-at-medium",
    "tag",
    "topics",
    "me",
    "email-settings",
];

const PLAIN_URL: &str = r#"https?://[^\s<>"')\]]+"#;

static MEDIUM_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static PLAIN_URL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

/// Articles linked from a saved digest email.
pub struct EmailDigestSource {
    name: String,
    path: PathBuf,
    attachments: Option<PathBuf>,
}

impl EmailDigestSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            attachments: None,
        }
    }

    /// Look for captured PDFs (`NN-title-words.pdf`, numbered in digest
    /// order) in `dir`.
    pub fn with_attachments(mut self, dir: impl Into<PathBuf>) -> Self {
        self.attachments = Some(dir.into());
        self
    }

    fn attachment_for(&self, position: usize, title: &str) -> Option<PathBuf> {
        let dir = self.attachments.as_ref()?;
        let file = dir.join(pdf_file_name(position, title));
        if file.is_file() {
            Some(file)
        } else {
            log::warn!("PDF not found: {}", file.display());
            None
        }
    }
}

#[async_trait]
impl ArticleSource for EmailDigestSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        log::info!("Reading digest {}", self.path.display());
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| AppError::source(&self.name, format!("{}: {e}", self.path.display())))?;
        let message = String::from_utf8_lossy(&bytes);

        let urls = extract_article_urls(&message);
        log::info!("Found {} article links", urls.len());

        let raws = urls
            .into_iter()
            .enumerate()
            .map(|(i, url)| {
                let title = title_from_url(&url);
                RawArticle {
                    attachment: self.attachment_for(i + 1, &title),
                    title,
                    url,
                    ..RawArticle::default()
                }
            })
            .collect();

        Ok(FetchOutcome::from_raw(raws, &self.name))
    }
}

/// A decoded leaf of the MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MimePart {
    content_type: String,
    body: String,
}

/// Medium article URLs in the message, in document order, without repeats.
pub fn extract_article_urls(message: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for part in mime_leaves(message) {
        let links = if part.content_type.starts_with("text/html") {
            html_links(&part.body)
        } else if part.content_type.starts_with("text/plain") {
            plain_links(&part.body)
        } else {
            continue;
        };

        for link in links {
            if let Some(url) = medium_article(&link) {
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
        }
    }

    urls
}

/// Canonical article URL if `link` points at a Medium article.
pub fn medium_article(link: &str) -> Option<String> {
    let re = MEDIUM_REGEX
        .get_or_init(|| Regex::new(MEDIUM_ARTICLE).ok())
        .as_ref()?;
    let caps = re.captures(link.trim())?;
    let section = caps.get(1)?.as_str();
    let slug = caps.get(2)?.as_str();

    if EXCLUDED_SECTIONS.contains(&section) {
        return None;
    }
    Some(format!("https://medium.com/{section}/{slug}"))
}

/// Readable title from an article slug: `my-post-0123456789ab` -> `My Post`.
pub fn title_from_url(url: &str) -> String {
    let slug = url.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    let mut words: Vec<&str> = slug.split('-').filter(|w| !w.is_empty()).collect();

    if let Some(last) = words.last() {
        let is_id = last.len() == 12
            && last.chars().any(|c| c.is_ascii_alphabetic())
            && last.chars().any(|c| c.is_ascii_digit());
        if is_id {
            words.pop();
        }
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// File name of the captured PDF for the article at `position` (1-based).
pub fn pdf_file_name(position: usize, title: &str) -> String {
    format!("{:02}-{}.pdf", position, title.to_lowercase().replace(' ', "-"))
}

fn html_links(html: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    Html::parse_document(html)
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect()
}

fn plain_links(text: &str) -> Vec<String> {
    let Some(re) = PLAIN_URL_REGEX
        .get_or_init(|| Regex::new(PLAIN_URL).ok())
        .as_ref()
    else {
        return Vec::new();
    };
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Walk the MIME tree and return its decoded leaves.
fn mime_leaves(message: &str) -> Vec<MimePart> {
    let mut leaves = Vec::new();
    collect_leaves(message, &mut leaves, 0);
    leaves
}

fn collect_leaves(entity: &str, leaves: &mut Vec<MimePart>, depth: usize) {
    const MAX_DEPTH: usize = 8;

    let (headers, body) = split_headers(entity);
    let content_type = header_value(&headers, "content-type")
        .unwrap_or_else(|| "text/plain".to_string());
    let lower = content_type.to_ascii_lowercase();

    if lower.starts_with("multipart/") && depth < MAX_DEPTH {
        if let Some(boundary) = boundary_of(&content_type) {
            for part in split_multipart(body, &boundary) {
                collect_leaves(part, leaves, depth + 1);
            }
            return;
        }
    }

    let encoding = header_value(&headers, "content-transfer-encoding")
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let decoded = match encoding.trim() {
        "base64" => decode_base64(body),
        "quoted-printable" => decode_quoted_printable(body),
        _ => body.to_string(),
    };

    leaves.push(MimePart {
        content_type: lower,
        body: decoded,
    });
}

/// Split an entity into unfolded header lines and the body.
fn split_headers(entity: &str) -> (Vec<(String, String)>, &str) {
    let (head, body) = match (entity.find("\r\n\r\n"), entity.find("\n\n")) {
        (Some(crlf), Some(lf)) if lf < crlf => (&entity[..lf], &entity[lf + 2..]),
        (Some(crlf), _) => (&entity[..crlf], &entity[crlf + 4..]),
        (None, Some(lf)) => (&entity[..lf], &entity[lf + 2..]),
        (None, None) => return (Vec::new(), entity),
    };

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in head.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        match line.split_once(':') {
            Some((name, value)) if is_header_name(name) => {
                headers.push((name.to_ascii_lowercase(), value.trim().to_string()));
            }
            // Not a MIME entity at all: treat the whole input as the body.
            _ => return (Vec::new(), entity),
        }
    }
    (headers, body)
}

fn is_header_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn header_value(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.clone())
}

fn boundary_of(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

fn split_multipart<'a>(body: &'a str, boundary: &str) -> Vec<&'a str> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();

    // Everything before the first delimiter is preamble.
    for chunk in body.split(delimiter.as_str()).skip(1) {
        if chunk.starts_with("--") {
            break;
        }
        let chunk = chunk
            .strip_prefix("\r\n")
            .or_else(|| chunk.strip_prefix('\n'))
            .unwrap_or(chunk);
        parts.push(chunk);
    }
    parts
}

fn decode_base64(body: &str) -> String {
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    match STANDARD.decode(compact.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            log::warn!("Undecodable base64 part: {e}");
            String::new()
        }
    }
}

fn decode_quoted_printable(body: &str) -> String {
    let bytes = body.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'=' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        // Soft line break
        if bytes[i + 1..].starts_with(b"\r\n") {
            i += 3;
            continue;
        }
        if bytes[i + 1..].starts_with(b"\n") {
            i += 2;
            continue;
        }
        let hex = bytes
            .get(i + 1..i + 3)
            .and_then(|h| std::str::from_utf8(h).ok())
            .and_then(|h| u8::from_str_radix(h, 16).ok());
        match hex {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(b'=');
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}
