// src/score.rs
//! Relevance scoring. Keyword/entity extraction is behind a capability trait
//! so the dictionary matcher can be swapped for something heavier without
//! touching the pipeline; the score itself is a deterministic weighted
//! combination of dictionary hits, entity-like matches, title presence and
//! recency.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::article::{Article, WeightedTerm};
use crate::config::BreakingConfig;

/// Extracts an ordered sequence of weighted terms from text. Must be
/// deterministic for identical input.
pub trait KeywordExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<WeightedTerm>;
}

static CASHTAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\$[a-z]{1,5}\b").expect("cashtag regex"));
static MONEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\$|€|£)\s?\d+(?:[\.,]\d+)?(?:\s?(?:bn|billion|m|million|k|thousand))?")
        .expect("money regex")
});
static TICKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{2,5}\b").expect("ticker regex"));

const TICKER_STOPLIST: &[&str] = &["THE", "AND", "FOR", "GMT", "UTC", "USD", "EUR"];

const DEFAULT_KEYWORDS: &[&str] = &[
    "inflation",
    "interest rate",
    "rates",
    "fed",
    "ecb",
    "boe",
    "earnings",
    "revenue",
    "profit",
    "loss",
    "guidance",
    "ipo",
    "bond",
    "yield",
    "stocks",
    "equities",
    "market",
    "oil",
    "gold",
    "bitcoin",
    "crypto",
    "forex",
    "usd",
    "eur",
    "gdp",
    "recession",
    "merger",
    "acquisition",
];

#[derive(Debug, Deserialize)]
struct KeywordFile {
    #[serde(default)]
    keywords: Vec<KeywordEntry>,
}

#[derive(Debug, Deserialize)]
struct KeywordEntry {
    term: String,
    #[serde(default = "default_weight")]
    weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Rule/dictionary matcher: configured keyword phrases plus cashtag, money
/// and ticker-like patterns. Deterministic and cheap; full NLP parity is not
/// a goal here.
pub struct DictionaryExtractor {
    keywords: Vec<(String, f64)>,
}

impl DictionaryExtractor {
    pub fn with_defaults() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS
                .iter()
                .map(|k| (k.to_string(), 1.0))
                .collect(),
        }
    }

    /// Load `{ "keywords": [ { "term": "...", "weight": 1.0 }, ... ] }`.
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let file: KeywordFile = serde_json::from_str(s)?;
        let mut keywords: Vec<(String, f64)> = file
            .keywords
            .into_iter()
            .map(|e| (e.term.to_lowercase(), e.weight))
            .filter(|(t, _)| !t.is_empty())
            .collect();
        keywords.sort_by(|a, b| a.0.cmp(&b.0));
        keywords.dedup_by(|a, b| a.0 == b.0);
        Ok(Self { keywords })
    }
}

impl KeywordExtractor for DictionaryExtractor {
    fn extract(&self, text: &str) -> Vec<WeightedTerm> {
        let lower = text.to_lowercase();
        let mut out: Vec<WeightedTerm> = Vec::new();

        for (term, weight) in &self.keywords {
            if lower.contains(term.as_str()) {
                out.push(WeightedTerm {
                    term: term.clone(),
                    weight: *weight,
                });
            }
        }
        for m in CASHTAG_RE.find_iter(text).take(10) {
            out.push(WeightedTerm {
                term: m.as_str().to_lowercase(),
                weight: 1.2,
            });
        }
        for m in MONEY_RE.find_iter(text).take(10) {
            out.push(WeightedTerm {
                term: m.as_str().to_lowercase(),
                weight: 0.8,
            });
        }
        for m in TICKER_RE.find_iter(text).take(20) {
            let tok = m.as_str();
            if TICKER_STOPLIST.contains(&tok) {
                continue;
            }
            out.push(WeightedTerm {
                term: tok.to_lowercase(),
                weight: 0.5,
            });
        }

        // Highest weight wins per term; final order: weight desc, term asc.
        out.sort_by(|a, b| {
            a.term.cmp(&b.term).then_with(|| {
                b.weight
                    .partial_cmp(&a.weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        out.dedup_by(|a, b| a.term == b.term);
        out.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.term.cmp(&b.term))
        });
        out
    }
}

const URGENCY_CUES: &[&str] = &["breaking", "just in", "urgent", "developing"];

pub struct Scorer {
    extractor: Arc<dyn KeywordExtractor>,
    cfg: BreakingConfig,
}

impl Scorer {
    pub fn new(extractor: Arc<dyn KeywordExtractor>, cfg: BreakingConfig) -> Self {
        Self { extractor, cfg }
    }

    /// Fill in keywords, score and breaking flag. Pure given (article, now).
    pub fn enrich(&self, article: Article) -> Article {
        self.enrich_at(article, Utc::now())
    }

    pub fn enrich_at(&self, mut article: Article, now: DateTime<Utc>) -> Article {
        let combined = format!("{}\n{}", article.title, article.body);
        let lower = combined.to_lowercase();
        let title_lower = article.title.to_lowercase();
        let terms = self.extractor.extract(&combined);

        let mut score = 0.0f64;
        if URGENCY_CUES.iter().any(|c| lower.contains(c)) {
            score += 0.35;
        }

        let density: f64 = terms.iter().map(|t| t.weight).sum();
        score += (0.05 * density).min(0.35);

        // Title matches weigh higher than body matches.
        let title_hits: f64 = terms
            .iter()
            .filter(|t| title_lower.contains(t.term.as_str()))
            .map(|t| t.weight)
            .sum();
        score += (0.10 * title_hits).min(0.20);

        let age_secs = (now - article.published_at.unwrap_or(article.retrieved_at))
            .num_seconds()
            .max(0) as u64;
        let recent = age_secs <= self.cfg.max_age_secs;
        if recent {
            score += 0.10;
        }

        article.score = score.clamp(0.0, 1.0);
        article.breaking = self.cfg.enabled && article.score >= self.cfg.min_score && recent;
        article.keywords = terms;
        article
    }
}
