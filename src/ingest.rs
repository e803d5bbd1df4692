//! Orchestrates the per-feed pipeline: fetch and sanitize, classify each
//! item, resolve an image, reconcile against the store. Categories run
//! sequentially; feeds within a category run in small bounded batches so a
//! slow host cannot monopolize the run.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};

use crate::classify;
use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::feed::{FeedItem, FeedSanitizer};
use crate::feeds::{self, QUICK_UPDATE_CATEGORIES, QUICK_UPDATE_FEEDS_PER_CATEGORY};
use crate::image::{ImageResolver, UsedImages};
use crate::models::{Category, NewArticle, UpsertOutcome};

const FEED_BATCH_SIZE: usize = 3;
const MAX_ITEMS_PER_FEED: usize = 20;

const MAX_TITLE_LEN: usize = 500;
const MAX_DESCRIPTION_LEN: usize = 1000;
const MAX_SOURCE_LEN: usize = 255;

const TICKER_WINDOW_HOURS: i64 = 24;
const TICKER_ITEMS_PER_CATEGORY: i64 = 6;

const RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone)]
pub struct CategorySummary {
    pub category: Category,
    pub total_feeds: usize,
    pub successful_feeds: usize,
    pub articles: usize,
    /// (feed url, error message) for feeds that failed outright.
    pub errors: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub categories: Vec<CategorySummary>,
    pub total_articles: usize,
    pub total_errors: usize,
    pub featured: usize,
    pub purged: usize,
}

pub struct IngestEngine {
    repo: Arc<Repository>,
    sanitizer: FeedSanitizer,
    images: ImageResolver,
    feed_overrides: Option<HashMap<Category, Vec<String>>>,
}

impl IngestEngine {
    pub fn new(repo: Arc<Repository>, config: &Config) -> Result<Self> {
        let feed_overrides = config.feed_overrides()?;
        Ok(Self {
            sanitizer: FeedSanitizer::new(),
            images: ImageResolver::new(repo.clone(), config),
            repo,
            feed_overrides,
        })
    }

    fn feed_list(&self, category: Category) -> Vec<String> {
        if let Some(feeds) = self
            .feed_overrides
            .as_ref()
            .and_then(|overrides| overrides.get(&category))
        {
            return feeds.clone();
        }
        feeds::feeds_for(category)
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Process every feed of every category, then refresh the ticker window
    /// and purge expired articles.
    pub async fn full_ingest(&self) -> Result<RunSummary> {
        tracing::info!("Starting RSS scraping across {} categories", Category::ALL.len());

        let used = UsedImages::new();
        let mut summary = RunSummary::default();

        for category in Category::ALL {
            let feeds = self.feed_list(category);
            let result = self.process_category(category, &feeds, &used).await;
            summary.total_articles += result.articles;
            summary.total_errors += result.errors.len();
            summary.categories.push(result);
        }

        summary.featured = self.refresh_ticker().await?;
        summary.purged = self.cleanup().await?;

        tracing::info!(
            articles = summary.total_articles,
            errors = summary.total_errors,
            featured = summary.featured,
            purged = summary.purged,
            "Scraping completed"
        );
        Ok(summary)
    }

    /// Fast pass over the two busiest feeds of the critical categories.
    pub async fn quick_update(&self) -> Result<RunSummary> {
        let used = UsedImages::new();
        let mut summary = RunSummary::default();

        for category in QUICK_UPDATE_CATEGORIES {
            let feeds: Vec<String> = self
                .feed_list(category)
                .into_iter()
                .take(QUICK_UPDATE_FEEDS_PER_CATEGORY)
                .collect();
            let result = self.process_category(category, &feeds, &used).await;
            summary.total_articles += result.articles;
            summary.total_errors += result.errors.len();
            summary.categories.push(result);
        }

        Ok(summary)
    }

    async fn process_category(
        &self,
        category: Category,
        feeds: &[String],
        used: &UsedImages,
    ) -> CategorySummary {
        tracing::info!("Processing category: {} with {} feeds", category, feeds.len());

        let results: Vec<(String, Result<usize>)> = stream::iter(feeds.to_vec())
            .map(|url| async move {
                let result = self.process_feed(&url, category, used).await;
                (url, result)
            })
            .buffer_unordered(FEED_BATCH_SIZE)
            .collect()
            .await;

        let mut summary = CategorySummary {
            category,
            total_feeds: feeds.len(),
            successful_feeds: 0,
            articles: 0,
            errors: Vec::new(),
        };
        for (url, result) in results {
            match result {
                Ok(count) => {
                    summary.successful_feeds += 1;
                    summary.articles += count;
                }
                Err(e) => summary.errors.push((url, e.to_string())),
            }
        }
        summary
    }

    /// One feed end to end. A structurally valid parse (even a degraded one)
    /// counts as a fetch success for feed health; hard fetch failures record
    /// the error and leave previously-stored articles untouched.
    async fn process_feed(
        &self,
        feed_url: &str,
        category: Category,
        used: &UsedImages,
    ) -> Result<usize> {
        tracing::debug!("Processing feed: {} for category: {}", feed_url, category);

        let feed = match self.sanitizer.fetch_feed(feed_url).await {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}", feed_url, e);
                if let Err(db_err) = self
                    .repo
                    .record_feed_error(feed_url, category, &e.to_string())
                    .await
                {
                    tracing::error!("Failed to record feed error: {}", db_err);
                }
                return Err(e);
            }
        };

        if feed.error {
            tracing::warn!(
                "Feed {} returned with errors: {}",
                feed_url,
                feed.error_message.as_deref().unwrap_or("unknown")
            );
        }

        self.repo.record_feed_success(feed_url, category).await?;

        let source_name = truncate(&feed.title, MAX_SOURCE_LEN);
        let mut processed = 0;
        for item in feed.items.iter().take(MAX_ITEMS_PER_FEED) {
            match self.ingest_item(item, category, &source_name, used).await {
                Ok(outcome) => {
                    processed += 1;
                    tracing::debug!("{}: {:?}", item.link, outcome);
                }
                Err(e) => tracing::error!("Error processing item from {}: {}", feed_url, e),
            }
        }

        Ok(processed)
    }

    async fn ingest_item(
        &self,
        item: &FeedItem,
        category: Category,
        source: &str,
        used: &UsedImages,
    ) -> Result<UpsertOutcome> {
        if item.link.is_empty() {
            return Err(anyhow::anyhow!("item has no link, cannot deduplicate").into());
        }

        let now = Utc::now();
        let pub_date = item.pub_date.unwrap_or(now);
        let description = item
            .snippet
            .clone()
            .or_else(|| item.content.clone())
            .unwrap_or_default();

        let severity = classify::severity_for(&item.title, &description);
        let is_featured = classify::is_featured(severity, pub_date, now);
        let tags = classify::tags_for(&item.title, &description, category, source);
        let image_url = self.images.resolve(item, category, used).await;

        let article = NewArticle {
            title: truncate(&item.title, MAX_TITLE_LEN),
            description: truncate(&description, MAX_DESCRIPTION_LEN),
            link: item.link.clone(),
            pub_date,
            source: source.to_string(),
            category,
            image_url: Some(image_url),
            content: item.content.clone(),
            is_featured,
            severity,
            tags,
        };

        let outcome = self.repo.upsert_article(article).await?;
        Ok(outcome)
    }

    /// Rolling spotlight window: feature the freshest high-importance items
    /// per category, then expire anything that left the window.
    pub async fn refresh_ticker(&self) -> Result<usize> {
        tracing::info!("Updating ticker featured news");
        let since = Utc::now() - Duration::hours(TICKER_WINDOW_HOURS);

        let mut featured = 0;
        for category in Category::ALL {
            let count = self
                .repo
                .feature_recent(category, since, TICKER_ITEMS_PER_CATEGORY)
                .await?;
            if count > 0 {
                tracing::info!("Featured {} news for category {}", count, category);
            }
            featured += count;
        }

        let expired = self.repo.unfeature_older_than(since).await?;
        if expired > 0 {
            tracing::debug!("Unfeatured {} expired news items", expired);
        }

        Ok(featured)
    }

    /// Recompute per-category 24h/total counts.
    pub async fn refresh_stats(&self) -> Result<usize> {
        let since = Utc::now() - Duration::hours(24);
        for category in Category::ALL {
            let daily = self.repo.count_articles(category, Some(since)).await?;
            let total = self.repo.count_articles(category, None).await?;
            self.repo
                .upsert_category_stats(category, daily, total)
                .await?;
        }
        Ok(Category::ALL.len())
    }

    /// Age-based retention purge.
    pub async fn cleanup(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(RETENTION_DAYS);
        let deleted = self.repo.delete_articles_older_than(cutoff).await?;
        tracing::info!("Deleted {} old news items", deleted);
        Ok(deleted)
    }

    #[cfg(test)]
    pub(crate) fn with_parts(
        repo: Arc<Repository>,
        images: ImageResolver,
        feed_overrides: Option<HashMap<Category, Vec<String>>>,
    ) -> Self {
        Self {
            repo,
            sanitizer: FeedSanitizer::new(),
            images,
            feed_overrides,
        }
    }
}

/// Character-safe truncation for bounded columns.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
