use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The eight fixed topic categories served by the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Cybersecurity,
    Ai,
    FinanceCrypto,
    SoftwareDevops,
    Iot,
    Cloud,
    DataScience,
    Quantum,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Cybersecurity,
        Category::Ai,
        Category::FinanceCrypto,
        Category::SoftwareDevops,
        Category::Iot,
        Category::Cloud,
        Category::DataScience,
        Category::Quantum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cybersecurity => "cybersecurity",
            Category::Ai => "ai",
            Category::FinanceCrypto => "finance-crypto",
            Category::SoftwareDevops => "software-devops",
            Category::Iot => "iot",
            Category::Cloud => "cloud",
            Category::DataScience => "data-science",
            Category::Quantum => "quantum",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cybersecurity" => Ok(Category::Cybersecurity),
            "ai" => Ok(Category::Ai),
            "finance-crypto" => Ok(Category::FinanceCrypto),
            "software-devops" => Ok(Category::SoftwareDevops),
            "iot" => Ok(Category::Iot),
            "cloud" => Ok(Category::Cloud),
            "data-science" => Ok(Category::DataScience),
            "quantum" => Ok(Category::Quantum),
            other => Err(AppError::Config(format!("unknown category: {other}"))),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse urgency classification. Variant order defines the escalation
/// ordering: a stored severity is never replaced by a lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    Trending,
    Hot,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::Trending => "trending",
            Severity::Hot => "hot",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Total parse: unrecognized values read back as `medium`, matching the
    /// column default.
    pub fn parse(s: &str) -> Severity {
        match s {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "hot" => Severity::Hot,
            "trending" => Severity::Trending,
            _ => Severity::Medium,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub link: String,
    pub pub_date: DateTime<Utc>,
    pub source: String,
    pub category: Category,
    pub image_url: Option<String>,
    pub content: Option<String>,
    pub is_featured: bool,
    pub severity: Severity,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A freshly-ingested item, before reconciliation against the store.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub description: String,
    pub link: String,
    pub pub_date: DateTime<Utc>,
    pub source: String,
    pub category: Category,
    pub image_url: Option<String>,
    pub content: Option<String>,
    pub is_featured: bool,
    pub severity: Severity,
    pub tags: Vec<String>,
}

/// Outcome of reconciling a [`NewArticle`] against the store by link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct FeedHealth {
    pub feed_url: String,
    pub category: Category,
    pub last_fetched: DateTime<Utc>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub error_count: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct ImageCacheEntry {
    pub article_hash: String,
    pub image_url: String,
    pub source: String,
    pub last_validated: DateTime<Utc>,
    pub usage_count: i64,
}

#[derive(Debug, Clone)]
pub struct ExecutionLogEntry {
    pub id: i64,
    pub job_name: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub items_processed: i64,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CategoryStats {
    pub category: Category,
    pub daily_count: i64,
    pub total_count: i64,
    pub last_updated: DateTime<Utc>,
}
