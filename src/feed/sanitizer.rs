use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use feed_rs::parser;
use regex::Regex;
use reqwest::Client;

use crate::error::Result;

const USER_AGENT_STRING: &str = "Mozilla/5.0 (compatible; TechHub RSS Scraper/1.0)";
const ACCEPT_FEED: &str = "application/rss+xml, application/xml, text/xml, */*";

/// How a known-problematic feed is handled before the normal parse path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProblemHandling {
    /// Return an empty-but-valid structure without touching the network.
    Skip(&'static str),
    /// Apply XML sanitization before the first parse attempt.
    HtmlEntityFix,
}

struct ProblemFeed {
    url: &'static str,
    handling: ProblemHandling,
    fallback_url: Option<&'static str>,
}

/// Feeds with a history of non-conformant output or permanent failure.
const PROBLEMATIC_FEEDS: &[ProblemFeed] = &[
    ProblemFeed {
        url: "https://www.artificialintelligence-news.com/feed/",
        handling: ProblemHandling::HtmlEntityFix,
        fallback_url: None,
    },
    ProblemFeed {
        url: "https://www.marktechpost.com/feed/",
        handling: ProblemHandling::HtmlEntityFix,
        fallback_url: None,
    },
    ProblemFeed {
        url: "https://venturebeat.com/ai/feed/",
        handling: ProblemHandling::Skip("404 - Feed no longer exists"),
        fallback_url: None,
    },
];

fn problem_config(feed_url: &str) -> Option<&'static ProblemFeed> {
    PROBLEMATIC_FEEDS.iter().find(|p| p.url == feed_url)
}

/// One entry of a parsed feed, normalized across RSS and Atom.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub pub_date: Option<DateTime<Utc>>,
    /// Raw HTML body, when the feed carries one.
    pub content: Option<String>,
    /// Plain-text rendering of the body, for classification and storage.
    pub snippet: Option<String>,
    /// Image candidate from media:content / media:thumbnail / enclosure.
    pub media_url: Option<String>,
}

/// A structurally valid parse result. `error` is set when the feed could not
/// be fetched or repaired; the items list is then empty but the caller never
/// has to special-case a missing structure.
#[derive(Debug, Clone)]
pub struct SanitizedFeed {
    pub title: String,
    pub link: String,
    pub items: Vec<FeedItem>,
    pub error: bool,
    pub error_message: Option<String>,
}

impl SanitizedFeed {
    fn degraded(feed_url: &str, reason: &str) -> Self {
        Self {
            title: feed_url.to_string(),
            link: feed_url.to_string(),
            items: Vec::new(),
            error: true,
            error_message: Some(reason.to_string()),
        }
    }
}

pub struct FeedSanitizer {
    client: Client,
}

impl FeedSanitizer {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT_STRING)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Fetch and parse a feed, repairing malformed XML when needed.
    ///
    /// Network and HTTP errors propagate to the caller; parse failures are
    /// recovered locally and degrade, at worst, to an empty flagged result.
    pub async fn fetch_feed(&self, feed_url: &str) -> Result<SanitizedFeed> {
        let config = problem_config(feed_url);

        if let Some(ProblemHandling::Skip(reason)) = config.map(|c| c.handling) {
            tracing::info!("Skipping known problematic feed {}: {}", feed_url, reason);
            return Ok(SanitizedFeed::degraded(feed_url, reason));
        }

        let body = self.fetch_raw(feed_url).await?;

        let text = if config.map(|c| c.handling) == Some(ProblemHandling::HtmlEntityFix) {
            sanitize_xml(&body)
        } else {
            body
        };

        let parse_error = match parser::parse(text.as_bytes()) {
            Ok(feed) => return Ok(convert_feed(feed, feed_url)),
            Err(e) => e,
        };
        tracing::debug!("Direct parsing failed for {}: {}", feed_url, parse_error);

        // Parse failures are XML-shaped by construction (the fetch already
        // succeeded), so repair the body we have and try again.
        let sanitized = sanitize_xml(&text);
        match parser::parse(sanitized.as_bytes()) {
            Ok(feed) => {
                tracing::info!("Successfully sanitized and parsed {}", feed_url);
                return Ok(convert_feed(feed, feed_url));
            }
            Err(e) => tracing::debug!("Sanitized re-parse failed for {}: {}", feed_url, e),
        }

        if let Some(fallback_url) = config.and_then(|c| c.fallback_url) {
            tracing::info!("Trying fallback URL: {}", fallback_url);
            if let Ok(body) = self.fetch_raw(fallback_url).await {
                if let Ok(feed) = parser::parse(body.as_bytes()) {
                    return Ok(convert_feed(feed, feed_url));
                }
            }
        }

        tracing::warn!("Feed {} unrecoverable: {}", feed_url, parse_error);
        Ok(SanitizedFeed::degraded(feed_url, &parse_error.to_string()))
    }

    async fn fetch_raw(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header("Accept", ACCEPT_FEED)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        Ok(response.text().await?)
    }
}

impl Default for FeedSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

fn convert_feed(feed: feed_rs::model::Feed, feed_url: &str) -> SanitizedFeed {
    let title = feed
        .title
        .map(|t| t.content)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| feed_url.to_string());
    let link = feed
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_else(|| feed_url.to_string());

    let items = feed.entries.into_iter().map(item_from_entry).collect();

    SanitizedFeed {
        title,
        link,
        items,
        error: false,
        error_message: None,
    }
}

fn item_from_entry(entry: feed_rs::model::Entry) -> FeedItem {
    let media_url = extract_media_url(&entry);

    // Try content first, then fall back to summary
    let content_html = entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()));

    let snippet = content_html
        .as_ref()
        .and_then(|html| html2text::from_read(html.as_bytes(), 80).ok())
        .map(|text| {
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|s| !s.is_empty());

    FeedItem {
        title: entry
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "Untitled".to_string()),
        link: entry
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default(),
        pub_date: entry.published.or(entry.updated),
        content: content_html,
        snippet,
        media_url,
    }
}

/// Pull the first usable image URL out of media:content, media:thumbnail or
/// an enclosure. Enclosures without a content type are accepted; typed ones
/// must be images.
fn extract_media_url(entry: &feed_rs::model::Entry) -> Option<String> {
    for media in &entry.media {
        if let Some(thumb) = media.thumbnails.first() {
            return Some(thumb.image.uri.clone());
        }
        for content in &media.content {
            if let Some(url) = &content.url {
                let is_image = content
                    .content_type
                    .as_ref()
                    .map(|t| t.to_string().starts_with("image/"))
                    .unwrap_or(true);
                if is_image {
                    return Some(url.to_string());
                }
            }
        }
    }
    None
}

/// Repair common XML conformance problems found in the wild.
pub fn sanitize_xml(xml: &str) -> String {
    // Named HTML entities that are invalid in plain XML, mapped to numeric
    // character references. Applied before ampersand escaping so the escape
    // pass sees only numeric and predefined entities.
    static ENTITY_RE: OnceLock<Regex> = OnceLock::new();
    let entity_re = ENTITY_RE.get_or_init(|| {
        Regex::new(
            r"(?i)&(nbsp|copy|reg|trade|euro|pound|yen|cent|mdash|ndash|hellip|ldquo|rdquo|lsquo|rsquo);",
        )
        .unwrap()
    });
    let mut cleaned = entity_re
        .replace_all(xml, |caps: &regex::Captures| {
            let code = match caps[1].to_ascii_lowercase().as_str() {
                "nbsp" => 160,
                "copy" => 169,
                "reg" => 174,
                "trade" => 8482,
                "euro" => 8364,
                "pound" => 163,
                "yen" => 165,
                "cent" => 162,
                "mdash" => 8212,
                "ndash" => 8211,
                "hellip" => 8230,
                "ldquo" => 8220,
                "rdquo" => 8221,
                "lsquo" => 8216,
                "rsquo" => 8217,
                _ => unreachable!(),
            };
            format!("&#{code};")
        })
        .into_owned();

    cleaned = escape_bare_ampersands(&cleaned);

    // Strip control characters except tab, newline and carriage return
    cleaned.retain(|c| matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{7f}'));

    // Re-escape comment terminators inside CDATA sections (the lazy match
    // already ends each section at its first "]]>")
    static CDATA_RE: OnceLock<Regex> = OnceLock::new();
    let cdata_re =
        CDATA_RE.get_or_init(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap());
    cleaned = cdata_re
        .replace_all(&cleaned, |caps: &regex::Captures| {
            format!("<![CDATA[{}]]>", caps[1].replace("-->", "--&gt;"))
        })
        .into_owned();

    // Quote bare attribute values
    static ATTR_RE: OnceLock<Regex> = OnceLock::new();
    let attr_re = ATTR_RE.get_or_init(|| {
        Regex::new(r#"(<[^!>]*?\s[a-zA-Z_:][-a-zA-Z0-9_:.]*)=([^\s"'>][^\s>]*)"#).unwrap()
    });
    cleaned = attr_re
        .replace_all(&cleaned, "${1}=\"${2}\"")
        .into_owned();

    cleaned
}

/// Escape `&` characters that do not begin a predefined or numeric entity.
fn escape_bare_ampersands(s: &str) -> String {
    static RECOGNIZED_ENTITY: OnceLock<Regex> = OnceLock::new();
    let recognized = RECOGNIZED_ENTITY.get_or_init(|| {
        Regex::new(r"^(?:amp|lt|gt|quot|apos|#[0-9]+|#x[0-9a-fA-F]+);").unwrap()
    });

    let mut out = String::with_capacity(s.len());
    for (idx, ch) in s.char_indices() {
        if ch == '&' && !recognized.is_match(&s[idx + 1..]) {
            out.push_str("&amp;");
        } else {
            out.push(ch);
        }
    }
    out
}
