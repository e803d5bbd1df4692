//! Keyword heuristics mapping article text to severity, featured
//! eligibility and tags. Pure functions; the clock is always injected.

use chrono::{DateTime, Duration, Utc};

use crate::models::{Category, Severity};

const CRITICAL_KEYWORDS: &[&str] = &[
    "breach", "hack", "zero-day", "critical", "emergency", "urgent", "exploit",
];
const HIGH_KEYWORDS: &[&str] = &[
    "vulnerability", "security", "warning", "alert", "risk", "threat",
];
const HOT_KEYWORDS: &[&str] = &[
    "breaking", "just in", "exclusive", "announces", "launches", "releases",
];
const TRENDING_KEYWORDS: &[&str] = &[
    "trending", "viral", "popular", "surge", "growth", "adoption",
];

const MAX_TAGS: usize = 5;

/// Scan title and description against the ordered keyword sets; the first
/// matching set wins.
pub fn severity_for(title: &str, description: &str) -> Severity {
    let combined = format!("{} {}", title.to_lowercase(), description.to_lowercase());

    if CRITICAL_KEYWORDS.iter().any(|k| combined.contains(k)) {
        return Severity::Critical;
    }
    if HIGH_KEYWORDS.iter().any(|k| combined.contains(k)) {
        return Severity::High;
    }
    if HOT_KEYWORDS.iter().any(|k| combined.contains(k)) {
        return Severity::Hot;
    }
    if TRENDING_KEYWORDS.iter().any(|k| combined.contains(k)) {
        return Severity::Trending;
    }

    Severity::Medium
}

/// Urgency-decaying spotlight window: higher severities stay eligible
/// longer, everything else never qualifies.
pub fn is_featured(severity: Severity, pub_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let age = now - pub_date;

    match severity {
        Severity::Critical => age <= Duration::hours(48),
        Severity::High => age <= Duration::hours(24),
        Severity::Hot | Severity::Trending => age <= Duration::hours(12),
        Severity::Medium => false,
    }
}

/// Category and source tags are always present; category-specific keyword
/// hits fill the remaining slots up to five, in insertion order.
pub fn tags_for(title: &str, description: &str, category: Category, source: &str) -> Vec<String> {
    let text = format!("{} {}", title, description).to_lowercase();

    let mut tags = vec![category.as_str().to_string(), source_slug(source)];

    for keyword in category_keywords(category) {
        if text.contains(keyword) && !tags.iter().any(|t| t == keyword) {
            tags.push(keyword.to_string());
        }
    }

    tags.truncate(MAX_TAGS);
    tags
}

/// Normalize a feed's display name into a tag slug.
pub fn source_slug(source: &str) -> String {
    source
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

fn category_keywords(category: Category) -> &'static [&'static str] {
    match category {
        Category::Cybersecurity => &[
            "security", "vulnerability", "malware", "ransomware", "phishing", "firewall",
            "encryption",
        ],
        Category::Ai => &[
            "machine learning", "deep learning", "neural network", "nlp", "computer vision",
            "gpt", "llm",
        ],
        Category::FinanceCrypto => &[
            "bitcoin", "ethereum", "blockchain", "defi", "nft", "web3", "trading",
        ],
        Category::SoftwareDevops => &[
            "kubernetes", "docker", "ci/cd", "microservices", "agile", "cloud native",
            "automation",
        ],
        Category::Iot => &[
            "sensors", "edge computing", "smart home", "industrial iot", "mqtt", "embedded",
            "5g",
        ],
        Category::Cloud => &[
            "aws", "azure", "gcp", "serverless", "saas", "paas", "iaas", "multi-cloud",
        ],
        Category::DataScience => &[
            "analytics", "big data", "data mining", "visualization", "statistics", "python",
            "r",
        ],
        Category::Quantum => &[
            "qubits", "quantum computing", "quantum algorithms", "quantum supremacy",
            "quantum cryptography",
        ],
    }
}
