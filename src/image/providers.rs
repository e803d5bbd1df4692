//! Stage 4: keyword search against external stock-image providers. Each
//! provider is only in the chain when its credential is configured, and a
//! result is only accepted if no earlier article in the run claimed it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::feed::FeedItem;
use crate::models::Category;

use super::{ImageSource, ImageStrategy, UsedImages};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(5);
const RESULTS_PER_SEARCH: &str = "30";

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "this", "that", "which", "when", "where", "what", "how",
];

const MAX_SEARCH_KEYWORDS: usize = 5;

/// Build a provider query from the title's meaningful words plus two
/// category seed terms.
pub(crate) fn search_keywords(title: &str, category: Category) -> String {
    let mut keywords: Vec<String> = Vec::new();

    for word in title.to_lowercase().split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        if cleaned.len() > 4 && !STOPWORDS.contains(&cleaned.as_str()) {
            keywords.push(cleaned);
        }
    }

    keywords.extend(
        search_terms(category)
            .iter()
            .take(2)
            .map(|s| s.to_string()),
    );

    keywords.truncate(MAX_SEARCH_KEYWORDS);
    keywords.join(" ")
}

fn search_terms(category: Category) -> &'static [&'static str] {
    match category {
        Category::Cybersecurity => &[
            "cybersecurity", "hacking", "data protection", "network security", "cyber attack",
            "encryption", "firewall", "malware",
        ],
        Category::Ai => &[
            "artificial intelligence", "machine learning", "neural network", "deep learning",
            "AI technology", "robotics", "automation", "algorithm",
        ],
        Category::FinanceCrypto => &[
            "cryptocurrency", "bitcoin", "ethereum", "blockchain", "trading",
            "digital currency", "defi", "crypto market",
        ],
        Category::SoftwareDevops => &[
            "programming", "coding", "software development", "devops", "cloud computing",
            "kubernetes", "docker", "agile",
        ],
        Category::Iot => &[
            "internet of things", "smart devices", "connected devices", "sensors",
            "smart home", "industrial iot", "embedded systems",
        ],
        Category::Cloud => &[
            "cloud computing", "data center", "server room", "cloud storage", "aws", "azure",
            "cloud technology", "saas",
        ],
        Category::DataScience => &[
            "data science", "analytics", "big data", "data visualization", "statistics",
            "data analysis", "machine learning", "dashboard",
        ],
        Category::Quantum => &[
            "quantum computing", "quantum physics", "quantum processor", "quantum technology",
            "qubits", "quantum mechanics", "quantum computer",
        ],
    }
}

pub struct UnsplashSearch {
    client: Client,
    access_key: String,
}

impl UnsplashSearch {
    pub fn new(client: Client, access_key: String) -> Self {
        Self { client, access_key }
    }
}

#[derive(Debug, Deserialize)]
struct UnsplashSearchResponse {
    results: Vec<UnsplashPhoto>,
}

#[derive(Debug, Deserialize)]
struct UnsplashPhoto {
    urls: UnsplashUrls,
}

#[derive(Debug, Deserialize)]
struct UnsplashUrls {
    regular: String,
}

#[async_trait]
impl ImageStrategy for UnsplashSearch {
    fn source(&self) -> ImageSource {
        ImageSource::Unsplash
    }

    async fn try_resolve(
        &self,
        item: &FeedItem,
        category: Category,
        used: &UsedImages,
    ) -> Option<String> {
        let query = search_keywords(&item.title, category);

        let response = self
            .client
            .get("https://api.unsplash.com/search/photos")
            .query(&[
                ("query", query.as_str()),
                ("per_page", RESULTS_PER_SEARCH),
                ("orientation", "landscape"),
            ])
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            tracing::debug!("Unsplash search failed: HTTP {}", response.status());
            return None;
        }

        let body: UnsplashSearchResponse = response.json().await.ok()?;
        for photo in body.results {
            if !used.contains(&photo.urls.regular).await {
                return Some(photo.urls.regular);
            }
        }
        None
    }
}

pub struct PexelsSearch {
    client: Client,
    api_key: String,
}

impl PexelsSearch {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct PexelsSearchResponse {
    photos: Vec<PexelsPhoto>,
}

#[derive(Debug, Deserialize)]
struct PexelsPhoto {
    src: PexelsSrc,
}

#[derive(Debug, Deserialize)]
struct PexelsSrc {
    large: String,
}

#[async_trait]
impl ImageStrategy for PexelsSearch {
    fn source(&self) -> ImageSource {
        ImageSource::Pexels
    }

    async fn try_resolve(
        &self,
        item: &FeedItem,
        category: Category,
        used: &UsedImages,
    ) -> Option<String> {
        let query = search_keywords(&item.title, category);

        let response = self
            .client
            .get("https://api.pexels.com/v1/search")
            .query(&[
                ("query", query.as_str()),
                ("per_page", RESULTS_PER_SEARCH),
                ("orientation", "landscape"),
            ])
            .header("Authorization", &self.api_key)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            tracing::debug!("Pexels search failed: HTTP {}", response.status());
            return None;
        }

        let body: PexelsSearchResponse = response.json().await.ok()?;
        for photo in body.photos {
            if !used.contains(&photo.src.large).await {
                return Some(photo.src.large);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_prefer_long_title_words() {
        let query = search_keywords(
            "Kubernetes cluster upgrade breaks the ingress layer",
            Category::SoftwareDevops,
        );
        let words: Vec<&str> = query.split(' ').collect();
        assert!(words.contains(&"kubernetes"));
        assert!(words.contains(&"cluster"));
        // Short words and stopwords never appear
        assert!(!words.contains(&"the"));
    }

    #[test]
    fn keywords_fall_back_to_category_seeds() {
        let query = search_keywords("AI wins", Category::Ai);
        assert_eq!(query, "artificial intelligence machine learning");
    }

    #[test]
    fn keywords_strip_punctuation() {
        let query = search_keywords("Exploit: \"zero-day\" found!", Category::Cybersecurity);
        assert!(query.contains("exploit"));
        assert!(query.contains("zeroday"));
        assert!(!query.contains('"'));
    }

    #[test]
    fn keywords_cap_at_five() {
        let query = search_keywords(
            "Massive quantum breakthrough promises faster optimization algorithms everywhere",
            Category::Quantum,
        );
        assert!(query.split(' ').count() <= 5 + 2); // multi-word seeds count as one keyword
    }
}
