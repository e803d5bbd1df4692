use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    Article, Category, CategoryStats, ExecutionLogEntry, FeedHealth, ImageCacheEntry, NewArticle,
    Severity, UpsertOutcome,
};

use super::schema::SCHEMA;

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Article operations

    /// Reconcile a freshly-ingested article against the store by link.
    ///
    /// Existing rows are only touched when the new pass represents an
    /// escalation (higher severity, newly-qualifying featured status) or
    /// backfills an empty image/content field. A later pass never downgrades
    /// what an earlier, more-informed pass recorded.
    pub async fn upsert_article(&self, article: NewArticle) -> Result<UpsertOutcome> {
        let tags_json = serde_json::to_string(&article.tags)?;
        let now = Utc::now().to_rfc3339();

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let existing: Option<(i64, String, i64, Option<String>, Option<String>)> = tx
                    .query_row(
                        "SELECT id, severity, is_featured, image_url, content FROM articles WHERE link = ?1",
                        params![article.link],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                            ))
                        },
                    )
                    .optional()?;

                let outcome = match existing {
                    Some((id, old_severity, old_featured, old_image, old_content)) => {
                        let old_severity = Severity::parse(&old_severity);
                        let merged_severity = old_severity.max(article.severity);
                        let old_featured = old_featured != 0;

                        let mut sets: Vec<&str> = Vec::new();
                        if merged_severity > old_severity {
                            sets.push("severity");
                        }
                        if article.is_featured && !old_featured {
                            sets.push("is_featured");
                        }
                        let backfill_image = old_image.as_deref().map_or(true, str::is_empty)
                            && article.image_url.is_some();
                        if backfill_image {
                            sets.push("image_url");
                        }
                        let backfill_content = old_content.as_deref().map_or(true, str::is_empty)
                            && article.content.is_some();
                        if backfill_content {
                            sets.push("content");
                        }

                        if sets.is_empty() {
                            UpsertOutcome::Unchanged
                        } else {
                            tx.execute(
                                r#"UPDATE articles SET
                                       severity = ?2,
                                       is_featured = ?3,
                                       image_url = COALESCE(?4, image_url),
                                       content = COALESCE(?5, content),
                                       updated_at = ?6
                                   WHERE id = ?1"#,
                                params![
                                    id,
                                    merged_severity.as_str(),
                                    old_featured || article.is_featured,
                                    if backfill_image { article.image_url.clone() } else { None },
                                    if backfill_content { article.content.clone() } else { None },
                                    now,
                                ],
                            )?;
                            UpsertOutcome::Updated
                        }
                    }
                    None => {
                        tx.execute(
                            r#"INSERT INTO articles
                                   (title, description, link, pub_date, source, category,
                                    image_url, content, is_featured, severity, tags,
                                    created_at, updated_at)
                               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)"#,
                            params![
                                article.title,
                                article.description,
                                article.link,
                                article.pub_date.to_rfc3339(),
                                article.source,
                                article.category.as_str(),
                                article.image_url,
                                article.content,
                                article.is_featured,
                                article.severity.as_str(),
                                tags_json,
                                now,
                            ],
                        )?;
                        UpsertOutcome::Inserted
                    }
                };

                tx.commit()?;
                Ok(outcome)
            })
            .await?;

        Ok(outcome)
    }

    /// Read interface consumed by the UI layer: category filter, optional
    /// featured filter, newest first.
    #[allow(dead_code)]
    pub async fn query_articles(
        &self,
        category: Option<Category>,
        featured_only: bool,
        limit: i64,
    ) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(move |conn| {
                let mut sql = String::from(
                    "SELECT id, title, description, link, pub_date, source, category, image_url, \
                     content, is_featured, severity, tags, created_at, updated_at FROM articles",
                );
                let mut clauses: Vec<String> = Vec::new();
                if let Some(cat) = category {
                    clauses.push(format!("category = '{}'", cat.as_str()));
                }
                if featured_only {
                    clauses.push("is_featured = 1".to_string());
                }
                if !clauses.is_empty() {
                    sql.push_str(" WHERE ");
                    sql.push_str(&clauses.join(" AND "));
                }
                sql.push_str(&format!(" ORDER BY pub_date DESC LIMIT {limit}"));

                let mut stmt = conn.prepare(&sql)?;
                let articles = stmt
                    .query_map([], |row| Ok(article_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    #[allow(dead_code)]
    pub async fn get_article_by_link(&self, link: &str) -> Result<Option<Article>> {
        let link = link.to_string();
        let article = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, title, description, link, pub_date, source, category, image_url, \
                     content, is_featured, severity, tags, created_at, updated_at \
                     FROM articles WHERE link = ?1",
                )?;
                let article = stmt
                    .query_row(params![link], |row| Ok(article_from_row(row)))
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    /// Age-based retention purge. Returns the number of rows deleted.
    pub async fn delete_articles_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM articles WHERE pub_date < ?1",
                    params![cutoff.to_rfc3339()],
                )?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }

    // Ticker operations

    /// Feature up to `limit` high-importance articles published since
    /// `since` in one category. Returns the number of rows flagged.
    pub async fn feature_recent(
        &self,
        category: Category,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE articles SET is_featured = 1, updated_at = ?4
                       WHERE is_featured = 0 AND id IN (
                           SELECT id FROM articles
                           WHERE category = ?1
                             AND severity IN ('critical', 'high', 'hot', 'trending')
                             AND pub_date >= ?2
                           ORDER BY pub_date DESC
                           LIMIT ?3
                       )"#,
                    params![category.as_str(), since.to_rfc3339(), limit, now],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    /// Roll expired items out of the ticker window. Returns the number of
    /// rows unflagged.
    pub async fn unfeature_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE articles SET is_featured = 0, updated_at = ?2 \
                     WHERE is_featured = 1 AND pub_date < ?1",
                    params![cutoff.to_rfc3339(), now],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    pub async fn count_articles(
        &self,
        category: Category,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| {
                let count = match since {
                    Some(since) => conn.query_row(
                        "SELECT COUNT(*) FROM articles WHERE category = ?1 AND pub_date >= ?2",
                        params![category.as_str(), since.to_rfc3339()],
                        |row| row.get(0),
                    )?,
                    None => conn.query_row(
                        "SELECT COUNT(*) FROM articles WHERE category = ?1",
                        params![category.as_str()],
                        |row| row.get(0),
                    )?,
                };
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    // Feed health operations

    pub async fn record_feed_success(&self, feed_url: &str, category: Category) -> Result<()> {
        let feed_url = feed_url.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO feed_health
                           (feed_url, category, last_fetched, last_success, last_error, error_count, is_active)
                       VALUES (?1, ?2, ?3, ?3, NULL, 0, 1)
                       ON CONFLICT(feed_url) DO UPDATE SET
                           category = excluded.category,
                           last_fetched = excluded.last_fetched,
                           last_success = excluded.last_success,
                           last_error = NULL,
                           error_count = 0,
                           is_active = 1"#,
                    params![feed_url, category.as_str(), now],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn record_feed_error(
        &self,
        feed_url: &str,
        category: Category,
        message: &str,
    ) -> Result<()> {
        let feed_url = feed_url.to_string();
        let message = message.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO feed_health
                           (feed_url, category, last_fetched, last_success, last_error, error_count, is_active)
                       VALUES (?1, ?2, ?3, NULL, ?4, 1, 1)
                       ON CONFLICT(feed_url) DO UPDATE SET
                           last_fetched = excluded.last_fetched,
                           last_error = excluded.last_error,
                           error_count = feed_health.error_count + 1,
                           is_active = 1"#,
                    params![feed_url, category.as_str(), now, message],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    #[allow(dead_code)]
    pub async fn get_feed_health(&self, feed_url: &str) -> Result<Option<FeedHealth>> {
        let feed_url = feed_url.to_string();
        let health = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT feed_url, category, last_fetched, last_success, last_error, \
                     error_count, is_active FROM feed_health WHERE feed_url = ?1",
                )?;
                let health = stmt
                    .query_row(params![feed_url], |row| Ok(feed_health_from_row(row)))
                    .optional()?;
                Ok(health)
            })
            .await?;
        Ok(health)
    }

    // Image cache operations

    pub async fn cached_image(&self, article_hash: &str) -> Result<Option<ImageCacheEntry>> {
        let article_hash = article_hash.to_string();
        let entry = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT article_hash, image_url, source, last_validated, usage_count \
                     FROM image_cache WHERE article_hash = ?1",
                )?;
                let entry = stmt
                    .query_row(params![article_hash], |row| Ok(image_cache_from_row(row)))
                    .optional()?;
                Ok(entry)
            })
            .await?;
        Ok(entry)
    }

    pub async fn save_image_cache(
        &self,
        article_hash: &str,
        image_url: &str,
        source: &str,
        validated_at: DateTime<Utc>,
    ) -> Result<()> {
        let article_hash = article_hash.to_string();
        let image_url = image_url.to_string();
        let source = source.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO image_cache
                           (article_hash, image_url, source, last_validated, usage_count)
                       VALUES (?1, ?2, ?3, ?4, 1)
                       ON CONFLICT(article_hash) DO UPDATE SET
                           image_url = excluded.image_url,
                           source = excluded.source,
                           last_validated = excluded.last_validated,
                           usage_count = image_cache.usage_count + 1"#,
                    params![article_hash, image_url, source, validated_at.to_rfc3339()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Execution log (append-only)

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_execution_log(
        &self,
        job_name: &str,
        status: &str,
        started_at: DateTime<Utc>,
        duration_ms: i64,
        items_processed: i64,
        error_message: Option<String>,
    ) -> Result<()> {
        let job_name = job_name.to_string();
        let status = status.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO execution_log
                           (job_name, status, started_at, duration_ms, items_processed, error_message)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                    params![
                        job_name,
                        status,
                        started_at.to_rfc3339(),
                        duration_ms,
                        items_processed,
                        error_message,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    #[allow(dead_code)]
    pub async fn recent_execution_logs(&self, limit: i64) -> Result<Vec<ExecutionLogEntry>> {
        let logs = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, job_name, status, started_at, duration_ms, items_processed, \
                     error_message FROM execution_log ORDER BY id DESC LIMIT ?1",
                )?;
                let logs = stmt
                    .query_map(params![limit], |row| Ok(execution_log_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(logs)
            })
            .await?;
        Ok(logs)
    }

    // Category stats

    pub async fn upsert_category_stats(
        &self,
        category: Category,
        daily_count: i64,
        total_count: i64,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO category_stats (category, daily_count, total_count, last_updated)
                       VALUES (?1, ?2, ?3, ?4)
                       ON CONFLICT(category) DO UPDATE SET
                           daily_count = excluded.daily_count,
                           total_count = excluded.total_count,
                           last_updated = excluded.last_updated"#,
                    params![category.as_str(), daily_count, total_count, now],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    #[allow(dead_code)]
    pub async fn get_category_stats(&self, category: Category) -> Result<Option<CategoryStats>> {
        let stats = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT category, daily_count, total_count, last_updated \
                     FROM category_stats WHERE category = ?1",
                )?;
                let stats = stmt
                    .query_row(params![category.as_str()], |row| {
                        Ok(category_stats_from_row(row))
                    })
                    .optional()?;
                Ok(stats)
            })
            .await?;
        Ok(stats)
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn article_from_row(row: &Row) -> Article {
    let tags: Vec<String> =
        serde_json::from_str(&row.get::<_, String>(11).unwrap()).unwrap_or_default();
    Article {
        id: row.get(0).unwrap(),
        title: row.get(1).unwrap(),
        description: row.get(2).unwrap(),
        link: row.get(3).unwrap(),
        pub_date: row
            .get::<_, String>(4)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        source: row.get(5).unwrap(),
        category: row.get::<_, String>(6).unwrap().parse().unwrap(),
        image_url: row.get(7).unwrap(),
        content: row.get(8).unwrap(),
        is_featured: row.get::<_, i64>(9).unwrap() != 0,
        severity: Severity::parse(&row.get::<_, String>(10).unwrap()),
        tags,
        created_at: row
            .get::<_, String>(12)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, String>(13)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

fn feed_health_from_row(row: &Row) -> FeedHealth {
    FeedHealth {
        feed_url: row.get(0).unwrap(),
        category: row.get::<_, String>(1).unwrap().parse().unwrap(),
        last_fetched: row
            .get::<_, String>(2)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        last_success: row
            .get::<_, Option<String>>(3)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        last_error: row.get(4).unwrap(),
        error_count: row.get(5).unwrap(),
        is_active: row.get::<_, i64>(6).unwrap() != 0,
    }
}

fn image_cache_from_row(row: &Row) -> ImageCacheEntry {
    ImageCacheEntry {
        article_hash: row.get(0).unwrap(),
        image_url: row.get(1).unwrap(),
        source: row.get(2).unwrap(),
        last_validated: row
            .get::<_, String>(3)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        usage_count: row.get(4).unwrap(),
    }
}

fn execution_log_from_row(row: &Row) -> ExecutionLogEntry {
    ExecutionLogEntry {
        id: row.get(0).unwrap(),
        job_name: row.get(1).unwrap(),
        status: row.get(2).unwrap(),
        started_at: row
            .get::<_, String>(3)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        duration_ms: row.get(4).unwrap(),
        items_processed: row.get(5).unwrap(),
        error_message: row.get(6).unwrap(),
    }
}

fn category_stats_from_row(row: &Row) -> CategoryStats {
    CategoryStats {
        category: row.get::<_, String>(0).unwrap().parse().unwrap(),
        daily_count: row.get(1).unwrap(),
        total_count: row.get(2).unwrap(),
        last_updated: row
            .get::<_, String>(3)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let repo = Repository::new(db_path.to_str().unwrap()).await.unwrap();
        (dir, repo)
    }

    fn sample_article(link: &str, severity: Severity) -> NewArticle {
        NewArticle {
            title: "Critical zero-day exploit found in Apache".to_string(),
            description: "A remote code execution flaw is being exploited.".to_string(),
            link: link.to_string(),
            pub_date: Utc::now() - Duration::hours(2),
            source: "The Hacker News".to_string(),
            category: Category::Cybersecurity,
            image_url: Some("https://example.com/image.jpg".to_string()),
            content: None,
            is_featured: true,
            severity,
            tags: vec!["cybersecurity".to_string(), "the-hacker-news".to_string()],
        }
    }

    #[tokio::test]
    async fn upsert_inserts_then_recognizes_duplicates() {
        let (_dir, repo) = test_repo().await;
        let article = sample_article("https://example.com/a", Severity::Critical);

        let outcome = repo.upsert_article(article.clone()).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        // Re-ingesting the identical item is benign and changes nothing.
        let outcome = repo.upsert_article(article).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);

        let stored = repo
            .get_article_by_link("https://example.com/a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.severity, Severity::Critical);
        assert!(stored.is_featured);
    }

    #[tokio::test]
    async fn upsert_never_downgrades_severity_or_featured() {
        let (_dir, repo) = test_repo().await;
        repo.upsert_article(sample_article("https://example.com/b", Severity::Critical))
            .await
            .unwrap();

        // A later pass that computes a lower severity must not stick.
        let mut weaker = sample_article("https://example.com/b", Severity::Medium);
        weaker.is_featured = false;
        let outcome = repo.upsert_article(weaker).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);

        let stored = repo
            .get_article_by_link("https://example.com/b")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.severity, Severity::Critical);
        assert!(stored.is_featured);
    }

    #[tokio::test]
    async fn upsert_escalates_severity_to_max() {
        let (_dir, repo) = test_repo().await;
        let mut first = sample_article("https://example.com/c", Severity::Hot);
        first.is_featured = false;
        repo.upsert_article(first).await.unwrap();

        let outcome = repo
            .upsert_article(sample_article("https://example.com/c", Severity::High))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let stored = repo
            .get_article_by_link("https://example.com/c")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.severity, Severity::High);
        assert!(stored.is_featured);
    }

    #[tokio::test]
    async fn upsert_backfills_empty_image_and_content() {
        let (_dir, repo) = test_repo().await;
        let mut bare = sample_article("https://example.com/d", Severity::Medium);
        bare.image_url = None;
        bare.content = None;
        bare.is_featured = false;
        repo.upsert_article(bare).await.unwrap();

        let mut enriched = sample_article("https://example.com/d", Severity::Medium);
        enriched.content = Some("<p>full body</p>".to_string());
        enriched.is_featured = false;
        let outcome = repo.upsert_article(enriched).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let stored = repo
            .get_article_by_link("https://example.com/d")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            stored.image_url.as_deref(),
            Some("https://example.com/image.jpg")
        );
        assert_eq!(stored.content.as_deref(), Some("<p>full body</p>"));
    }

    #[tokio::test]
    async fn query_articles_filters_and_orders() {
        let (_dir, repo) = test_repo().await;
        for (i, link) in ["https://e.com/1", "https://e.com/2", "https://e.com/3"]
            .iter()
            .enumerate()
        {
            let mut a = sample_article(link, Severity::Medium);
            a.pub_date = Utc::now() - Duration::hours(i as i64);
            a.is_featured = i == 0;
            repo.upsert_article(a).await.unwrap();
        }
        let mut other = sample_article("https://e.com/ai", Severity::Medium);
        other.category = Category::Ai;
        other.is_featured = false;
        repo.upsert_article(other).await.unwrap();

        let all = repo
            .query_articles(Some(Category::Cybersecurity), false, 50)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].pub_date >= w[1].pub_date));

        let featured = repo
            .query_articles(Some(Category::Cybersecurity), true, 50)
            .await
            .unwrap();
        assert_eq!(featured.len(), 1);
        assert_eq!(featured[0].link, "https://e.com/1");
    }

    #[tokio::test]
    async fn ticker_features_recent_and_expires_old() {
        let (_dir, repo) = test_repo().await;
        let now = Utc::now();

        let mut recent = sample_article("https://e.com/recent", Severity::High);
        recent.pub_date = now - Duration::hours(3);
        recent.is_featured = false;
        repo.upsert_article(recent).await.unwrap();

        let mut stale = sample_article("https://e.com/stale", Severity::Critical);
        stale.pub_date = now - Duration::hours(40);
        stale.is_featured = true;
        repo.upsert_article(stale).await.unwrap();

        let featured = repo
            .feature_recent(Category::Cybersecurity, now - Duration::hours(24), 6)
            .await
            .unwrap();
        assert_eq!(featured, 1);

        let expired = repo
            .unfeature_older_than(now - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(expired, 1);

        let stored = repo
            .get_article_by_link("https://e.com/stale")
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_featured);
    }

    #[tokio::test]
    async fn retention_purges_old_articles() {
        let (_dir, repo) = test_repo().await;
        let mut old = sample_article("https://e.com/old", Severity::Medium);
        old.pub_date = Utc::now() - Duration::days(45);
        repo.upsert_article(old).await.unwrap();
        repo.upsert_article(sample_article("https://e.com/new", Severity::Medium))
            .await
            .unwrap();

        let deleted = repo
            .delete_articles_older_than(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(repo
            .get_article_by_link("https://e.com/old")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn feed_health_error_counter_increments_and_resets() {
        let (_dir, repo) = test_repo().await;
        let url = "https://broken.example.com/feed";

        repo.record_feed_error(url, Category::Ai, "timeout").await.unwrap();
        repo.record_feed_error(url, Category::Ai, "503").await.unwrap();
        let health = repo.get_feed_health(url).await.unwrap().unwrap();
        assert_eq!(health.error_count, 2);
        assert_eq!(health.last_error.as_deref(), Some("503"));
        assert!(health.last_success.is_none());

        repo.record_feed_success(url, Category::Ai).await.unwrap();
        let health = repo.get_feed_health(url).await.unwrap().unwrap();
        assert_eq!(health.error_count, 0);
        assert!(health.last_error.is_none());
        assert!(health.last_success.is_some());
    }

    #[tokio::test]
    async fn image_cache_upserts_and_counts_usage() {
        let (_dir, repo) = test_repo().await;
        let now = Utc::now();

        repo.save_image_cache("abc123", "https://img.example.com/1.jpg", "rss_feed", now)
            .await
            .unwrap();
        repo.save_image_cache("abc123", "https://img.example.com/1.jpg", "rss_feed", now)
            .await
            .unwrap();

        let entry = repo.cached_image("abc123").await.unwrap().unwrap();
        assert_eq!(entry.usage_count, 2);
        assert_eq!(entry.source, "rss_feed");
        assert!(repo.cached_image("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn execution_log_is_append_only() {
        let (_dir, repo) = test_repo().await;
        repo.insert_execution_log("full-ingest", "success", Utc::now(), 1200, 42, None)
            .await
            .unwrap();
        repo.insert_execution_log(
            "full-ingest",
            "error",
            Utc::now(),
            80,
            0,
            Some("store unreachable".to_string()),
        )
        .await
        .unwrap();

        let logs = repo.recent_execution_logs(10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].status, "error");
        assert_eq!(logs[1].items_processed, 42);
    }

    #[tokio::test]
    async fn category_stats_upsert_replaces_counts() {
        let (_dir, repo) = test_repo().await;
        repo.upsert_category_stats(Category::Quantum, 3, 10).await.unwrap();
        repo.upsert_category_stats(Category::Quantum, 5, 12).await.unwrap();

        let stats = repo
            .get_category_stats(Category::Quantum)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.daily_count, 5);
        assert_eq!(stats.total_count, 12);
    }
}
