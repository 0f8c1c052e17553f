// src/article.rs
use chrono::{DateTime, Utc};

/// A keyword or entity term together with the weight it contributes
/// to the relevance score. Ordered by descending weight in `Article`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WeightedTerm {
    pub term: String,
    pub weight: f64,
}

/// Canonical article record. Created by the normalizer, enriched by the
/// scorer, immutable once emitted to the sink.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Article {
    /// Stable identity: hex sha256 prefix over the canonical URL, or over
    /// (source, title, body prefix) when the URL is not canonicalizable.
    pub id: String,
    pub source: String,
    pub title: String,
    pub body: String,
    /// None for sources that do not publish timestamps.
    pub published_at: Option<DateTime<Utc>>,
    pub retrieved_at: DateTime<Utc>,
    pub keywords: Vec<WeightedTerm>,
    pub score: f64,
    pub breaking: bool,
    pub url: String,
}
