//! Resolution strategies that work from the article itself: structured feed
//! metadata first, then a scrape of the article's own page.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::feed::FeedItem;
use crate::models::Category;

use super::{has_http_scheme, validate_image_url, ImageSource, ImageStrategy, UsedImages};

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(7);

/// Minimum rendered size for an in-page image to count as article art
/// rather than an icon.
const MIN_IMG_WIDTH: u32 = 300;
const MIN_IMG_HEIGHT: u32 = 200;

/// Stage 2: image embedded in the feed entry (media attachment, image
/// enclosure, or an `<img>` tag inside the HTML content).
pub struct FeedImage {
    client: Client,
}

impl FeedImage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageStrategy for FeedImage {
    fn source(&self) -> ImageSource {
        ImageSource::RssFeed
    }

    async fn try_resolve(
        &self,
        item: &FeedItem,
        _category: Category,
        used: &UsedImages,
    ) -> Option<String> {
        let candidate = item
            .media_url
            .clone()
            .or_else(|| item.content.as_deref().and_then(find_img_src))?;

        if validate_image_url(&self.client, &candidate, used).await {
            Some(candidate)
        } else {
            None
        }
    }
}

/// First `<img src=...>` in an HTML fragment.
pub(crate) fn find_img_src(html: &str) -> Option<String> {
    static IMG_RE: OnceLock<Regex> = OnceLock::new();
    let img_re =
        IMG_RE.get_or_init(|| Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).unwrap());
    img_re
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Stage 3: fetch the article page and hunt for its lead image in priority
/// order (Open Graph, Twitter card, schema.org, article containers, generic
/// content images).
pub struct ArticleScrape {
    client: Client,
}

impl ArticleScrape {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageStrategy for ArticleScrape {
    fn source(&self) -> ImageSource {
        ImageSource::ArticleExtraction
    }

    async fn try_resolve(
        &self,
        item: &FeedItem,
        _category: Category,
        used: &UsedImages,
    ) -> Option<String> {
        if !has_http_scheme(&item.link) {
            return None;
        }

        let response = self
            .client
            .get(&item.link)
            .timeout(SCRAPE_TIMEOUT)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let html = response.text().await.ok()?;

        for candidate in collect_candidates(&html, &item.link) {
            if validate_image_url(&self.client, &candidate, used).await {
                return Some(candidate);
            }
        }
        None
    }
}

/// Extract image candidates from a page, best first, resolved against the
/// page URL and deduplicated. The parsed document is dropped before any
/// network I/O happens on the result.
pub(crate) fn collect_candidates(html: &str, base_url: &str) -> Vec<String> {
    let mut candidates: Vec<(String, u8)> = Vec::new();
    let document = Html::parse_document(html);

    let og_selector = Selector::parse(r#"meta[property="og:image"]"#).unwrap();
    let og_image = document
        .select(&og_selector)
        .next()
        .and_then(|e| e.value().attr("content"))
        .map(str::to_string);
    if let Some(url) = &og_image {
        candidates.push((url.clone(), 10));
    }

    let twitter_selector = Selector::parse(r#"meta[name="twitter:image"]"#).unwrap();
    if let Some(url) = document
        .select(&twitter_selector)
        .next()
        .and_then(|e| e.value().attr("content"))
    {
        if og_image.as_deref() != Some(url) {
            candidates.push((url.to_string(), 9));
        }
    }

    let ld_selector = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    for script in document.select(&ld_selector) {
        let text = script.text().collect::<String>();
        let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) else {
            continue;
        };
        let image = match &json["image"] {
            serde_json::Value::Array(items) => items.first().and_then(|v| v.as_str()),
            value => value.as_str(),
        };
        if let Some(url) = image {
            candidates.push((url.to_string(), 8));
        }
    }

    let hero_selector = Selector::parse(
        "article img, .article-hero img, .featured-image img, .post-thumbnail img",
    )
    .unwrap();
    for img in document.select(&hero_selector) {
        let Some(src) = img.value().attr("src").or_else(|| img.value().attr("data-src"))
        else {
            continue;
        };
        let width: u32 = img
            .value()
            .attr("width")
            .and_then(|w| w.parse().ok())
            .unwrap_or(0);
        let height: u32 = img
            .value()
            .attr("height")
            .and_then(|h| h.parse().ok())
            .unwrap_or(0);

        if width > MIN_IMG_WIDTH || height > MIN_IMG_HEIGHT || (width == 0 && height == 0) {
            candidates.push((src.to_string(), 7));
        }
    }

    let content_selector = Selector::parse(".content img, .entry-content img, main img").unwrap();
    for img in document.select(&content_selector) {
        if let Some(src) = img.value().attr("src").or_else(|| img.value().attr("data-src")) {
            if !candidates.iter().any(|(url, _)| url == src) {
                candidates.push((src.to_string(), 5));
            }
        }
    }

    candidates.sort_by(|a, b| b.1.cmp(&a.1));

    let mut resolved = Vec::new();
    for (candidate, _) in candidates {
        if let Some(url) = resolve_url(&candidate, base_url) {
            if !resolved.contains(&url) {
                resolved.push(url);
            }
        }
    }
    resolved
}

/// Resolve a possibly-relative URL against the page it came from.
pub(crate) fn resolve_url(href: &str, base_url: &str) -> Option<String> {
    if has_http_scheme(href) {
        return Some(href.to_string());
    }
    let base = Url::parse(base_url).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_img_src_in_content() {
        let html = r#"<p>intro</p><img class="lead" src="https://cdn.example.com/a.jpg"> <img src="https://cdn.example.com/b.jpg">"#;
        assert_eq!(
            find_img_src(html).as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
        assert!(find_img_src("<p>no images</p>").is_none());
    }

    #[test]
    fn resolves_relative_urls_against_page() {
        let base = "https://news.example.com/2026/08/story.html";
        assert_eq!(
            resolve_url("/img/lead.jpg", base).as_deref(),
            Some("https://news.example.com/img/lead.jpg")
        );
        assert_eq!(
            resolve_url("//cdn.example.com/lead.jpg", base).as_deref(),
            Some("https://cdn.example.com/lead.jpg")
        );
        assert_eq!(
            resolve_url("https://cdn.example.com/abs.jpg", base).as_deref(),
            Some("https://cdn.example.com/abs.jpg")
        );
    }

    #[test]
    fn candidates_are_ordered_by_priority() {
        let html = r#"<html><head>
            <meta property="og:image" content="/og.jpg">
            <meta name="twitter:image" content="/twitter.jpg">
            <script type="application/ld+json">{"image": ["/schema.jpg"]}</script>
        </head><body>
            <article><img src="/hero.jpg" width="800" height="600"></article>
            <main><img src="/inline.jpg"></main>
        </body></html>"#;

        let candidates = collect_candidates(html, "https://news.example.com/story");
        assert_eq!(
            candidates,
            vec![
                "https://news.example.com/og.jpg",
                "https://news.example.com/twitter.jpg",
                "https://news.example.com/schema.jpg",
                "https://news.example.com/hero.jpg",
                "https://news.example.com/inline.jpg",
            ]
        );
    }

    #[test]
    fn small_images_are_skipped_as_icons() {
        let html = r#"<article>
            <img src="/icon.png" width="32" height="32">
            <img src="/lead.jpg" width="1024" height="512">
        </article>"#;
        let candidates = collect_candidates(html, "https://news.example.com/story");
        assert_eq!(candidates, vec!["https://news.example.com/lead.jpg"]);
    }

    #[test]
    fn duplicate_og_and_twitter_images_collapse() {
        let html = r#"<head>
            <meta property="og:image" content="https://cdn.example.com/same.jpg">
            <meta name="twitter:image" content="https://cdn.example.com/same.jpg">
        </head>"#;
        let candidates = collect_candidates(html, "https://news.example.com/story");
        assert_eq!(candidates, vec!["https://cdn.example.com/same.jpg"]);
    }
}
