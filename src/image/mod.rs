//! Layered image resolution: cache, feed metadata, full-page scrape,
//! provider search, deterministic placeholder. Each article gets exactly
//! one image URL; a run-scoped used-set keeps concurrently-displayed
//! articles visually distinct.

mod extract;
mod placeholder;
mod providers;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use indexmap::IndexSet;
use reqwest::Client;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::db::Repository;
use crate::feed::FeedItem;
use crate::models::Category;

pub use placeholder::{placeholder_image, Placeholder};

/// Cache entries older than this are treated as stale and re-resolved.
const CACHE_VALIDITY_DAYS: i64 = 30;

/// Bounds for the session-scoped used-image set.
const USED_IMAGES_MAX: usize = 1000;
const USED_IMAGES_KEEP: usize = 500;

const VALIDATE_TIMEOUT: StdDuration = StdDuration::from_secs(3);

/// Which resolution strategy produced an image; recorded in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    RssFeed,
    ArticleExtraction,
    Unsplash,
    Pexels,
    Generated,
}

impl ImageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSource::RssFeed => "rss_feed",
            ImageSource::ArticleExtraction => "article_extraction",
            ImageSource::Unsplash => "unsplash",
            ImageSource::Pexels => "pexels",
            ImageSource::Generated => "generated",
        }
    }
}

/// Image URLs already assigned during the current run. Insertion-ordered so
/// the trim keeps the most recent entries.
pub struct UsedImages {
    inner: Mutex<IndexSet<String>>,
}

impl UsedImages {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(IndexSet::new()),
        }
    }

    pub async fn contains(&self, url: &str) -> bool {
        self.inner.lock().await.contains(url)
    }

    pub async fn insert(&self, url: &str) {
        let mut set = self.inner.lock().await;
        set.insert(url.to_string());
        if set.len() > USED_IMAGES_MAX {
            let split_at = set.len() - USED_IMAGES_KEEP;
            let tail = set.split_off(split_at);
            *set = tail;
        }
    }

    #[allow(dead_code)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

impl Default for UsedImages {
    fn default() -> Self {
        Self::new()
    }
}

/// One step of the fallback chain. Strategies are tried in order until one
/// produces a URL.
#[async_trait]
pub trait ImageStrategy: Send + Sync {
    fn source(&self) -> ImageSource;

    async fn try_resolve(
        &self,
        item: &FeedItem,
        category: Category,
        used: &UsedImages,
    ) -> Option<String>;
}

/// Stable fingerprint of an article, used as the image-cache key.
pub fn article_hash(title: &str, link: &str) -> String {
    format!("{:x}", md5::compute(format!("{title}{link}")))
}

pub(crate) fn has_http_scheme(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Reachability and content check shared by the chain: http(s) scheme,
/// unused this session, `image/*` content type, larger than 5 KB (smaller
/// responses are usually icons).
pub(crate) async fn validate_image_url(client: &Client, url: &str, used: &UsedImages) -> bool {
    if !has_http_scheme(url) {
        return false;
    }
    if used.contains(url).await {
        return false;
    }

    let response = match client.head(url).timeout(VALIDATE_TIMEOUT).send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!("Image validation failed for {}: {}", url, e);
            return false;
        }
    };

    if !response.status().is_success() {
        return false;
    }

    let is_image = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("image/"))
        .unwrap_or(false);

    let content_length: u64 = response
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    is_image && content_length > 5000
}

pub struct ImageResolver {
    repo: Arc<Repository>,
    strategies: Vec<Box<dyn ImageStrategy>>,
}

impl ImageResolver {
    pub fn new(repo: Arc<Repository>, config: &Config) -> Self {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(2))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .expect("Failed to create HTTP client");

        let mut strategies: Vec<Box<dyn ImageStrategy>> = vec![
            Box::new(extract::FeedImage::new(client.clone())),
            Box::new(extract::ArticleScrape::new(client.clone())),
        ];
        // Providers without a configured credential are simply not in the chain
        if let Some(key) = &config.unsplash_access_key {
            strategies.push(Box::new(providers::UnsplashSearch::new(
                client.clone(),
                key.clone(),
            )));
        }
        if let Some(key) = &config.pexels_api_key {
            strategies.push(Box::new(providers::PexelsSearch::new(
                client.clone(),
                key.clone(),
            )));
        }
        strategies.push(Box::new(placeholder::Placeholder));

        Self { repo, strategies }
    }

    #[cfg(test)]
    pub(crate) fn with_strategies(
        repo: Arc<Repository>,
        strategies: Vec<Box<dyn ImageStrategy>>,
    ) -> Self {
        Self { repo, strategies }
    }

    /// Produce exactly one image URL for the article, consulting the
    /// persistent cache first and writing every resolution back through it.
    pub async fn resolve(&self, item: &FeedItem, category: Category, used: &UsedImages) -> String {
        let hash = article_hash(&item.title, &item.link);

        match self.repo.cached_image(&hash).await {
            Ok(Some(entry)) => {
                let fresh =
                    Utc::now() - entry.last_validated < Duration::days(CACHE_VALIDITY_DAYS);
                if fresh && !used.contains(&entry.image_url).await {
                    used.insert(&entry.image_url).await;
                    return entry.image_url;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("Image cache lookup failed for {}: {}", item.link, e),
        }

        for strategy in &self.strategies {
            if let Some(url) = strategy.try_resolve(item, category, used).await {
                used.insert(&url).await;
                if let Err(e) = self
                    .repo
                    .save_image_cache(&hash, &url, strategy.source().as_str(), Utc::now())
                    .await
                {
                    tracing::warn!("Failed to cache image for {}: {}", item.link, e);
                }
                tracing::debug!(
                    source = strategy.source().as_str(),
                    url = %url,
                    "Resolved image"
                );
                return url;
            }
        }

        // The placeholder strategy never misses; reaching this line means the
        // chain was constructed without it.
        let url = placeholder::placeholder_image(&item.title, &item.link, category);
        used.insert(&url).await;
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item(title: &str, link: &str) -> FeedItem {
        FeedItem {
            title: title.to_string(),
            link: link.to_string(),
            pub_date: Some(Utc::now()),
            content: None,
            snippet: None,
            media_url: None,
        }
    }

    async fn test_repo() -> (tempfile::TempDir, Arc<Repository>) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let repo = Repository::new(db_path.to_str().unwrap()).await.unwrap();
        (dir, Arc::new(repo))
    }

    fn placeholder_only(repo: Arc<Repository>) -> ImageResolver {
        ImageResolver::with_strategies(repo, vec![Box::new(placeholder::Placeholder)])
    }

    #[test]
    fn article_hash_is_stable() {
        let a = article_hash("Title", "https://example.com/a");
        let b = article_hash("Title", "https://example.com/a");
        assert_eq!(a, b);
        assert_ne!(a, article_hash("Title", "https://example.com/b"));
    }

    #[test]
    fn scheme_check_rejects_everything_but_http() {
        assert!(has_http_scheme("https://example.com/a.jpg"));
        assert!(has_http_scheme("http://example.com/a.jpg"));
        assert!(!has_http_scheme("file:///etc/passwd"));
        assert!(!has_http_scheme("//cdn.example.com/a.jpg"));
        assert!(!has_http_scheme("/relative/a.jpg"));
        assert!(!has_http_scheme(""));
    }

    #[tokio::test]
    async fn used_images_trims_to_recent_entries() {
        let used = UsedImages::new();
        for i in 0..1001 {
            used.insert(&format!("https://img.example.com/{i}.jpg")).await;
        }
        assert_eq!(used.len().await, 500);
        // The trim keeps the newest entries and drops the oldest
        assert!(used.contains("https://img.example.com/1000.jpg").await);
        assert!(!used.contains("https://img.example.com/0.jpg").await);
    }

    #[tokio::test]
    async fn resolve_always_returns_one_http_url() {
        let (_dir, repo) = test_repo().await;
        let resolver = placeholder_only(repo);
        let used = UsedImages::new();

        let url = resolver
            .resolve(
                &sample_item("Some quiet title", "https://example.com/x"),
                Category::Cloud,
                &used,
            )
            .await;
        assert!(url.starts_with("http://") || url.starts_with("https://"));
        assert!(!url.is_empty());
    }

    #[tokio::test]
    async fn resolve_prefers_fresh_cache_entry() {
        let (_dir, repo) = test_repo().await;
        let item = sample_item("Cached story", "https://example.com/cached");
        let hash = article_hash(&item.title, &item.link);
        repo.save_image_cache(&hash, "https://img.example.com/cached.jpg", "rss_feed", Utc::now())
            .await
            .unwrap();

        let resolver = placeholder_only(repo);
        let used = UsedImages::new();
        let url = resolver.resolve(&item, Category::Ai, &used).await;
        assert_eq!(url, "https://img.example.com/cached.jpg");
        assert!(used.contains(&url).await);
    }

    #[tokio::test]
    async fn resolve_ignores_stale_cache_entry() {
        let (_dir, repo) = test_repo().await;
        let item = sample_item("Old cached story", "https://example.com/stale");
        let hash = article_hash(&item.title, &item.link);
        repo.save_image_cache(
            &hash,
            "https://img.example.com/stale.jpg",
            "rss_feed",
            Utc::now() - Duration::days(31),
        )
        .await
        .unwrap();

        let resolver = placeholder_only(repo.clone());
        let used = UsedImages::new();
        let url = resolver.resolve(&item, Category::Ai, &used).await;
        assert_ne!(url, "https://img.example.com/stale.jpg");

        // The fresh resolution is written back through the cache
        let entry = repo.cached_image(&hash).await.unwrap().unwrap();
        assert_eq!(entry.image_url, url);
        assert_eq!(entry.source, "generated");
    }

    #[tokio::test]
    async fn resolve_skips_cache_entry_already_used_this_run() {
        let (_dir, repo) = test_repo().await;
        let item = sample_item("Shared image story", "https://example.com/shared");
        let hash = article_hash(&item.title, &item.link);
        repo.save_image_cache(&hash, "https://img.example.com/shared.jpg", "unsplash", Utc::now())
            .await
            .unwrap();

        let resolver = placeholder_only(repo);
        let used = UsedImages::new();
        used.insert("https://img.example.com/shared.jpg").await;

        let url = resolver.resolve(&item, Category::Iot, &used).await;
        assert_ne!(url, "https://img.example.com/shared.jpg");
    }

    #[tokio::test]
    async fn identical_titles_resolve_to_distinct_images() {
        let (_dir, repo) = test_repo().await;
        let resolver = placeholder_only(repo);
        let used = UsedImages::new();

        let first = resolver
            .resolve(
                &sample_item("Same headline", "https://a.example.com/story"),
                Category::Quantum,
                &used,
            )
            .await;
        let second = resolver
            .resolve(
                &sample_item("Same headline", "https://b.example.com/story"),
                Category::Quantum,
                &used,
            )
            .await;
        assert_ne!(first, second);
    }
}
