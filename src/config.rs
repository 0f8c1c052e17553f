// src/config.rs
//! Resolved pipeline configuration. The process-level loader (files, env,
//! CLI) lives with the caller; the pipeline only ever sees these types. A
//! TOML constructor is provided for the demo binary and tests.

use serde::Deserialize;
use std::time::Duration;

use crate::error::ConfigError;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub breaking: BreakingConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: PipelineConfig = toml::from_str(s)?;
        Ok(cfg)
    }
}

/// One configured origin of articles. Immutable after load.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: SourceKind,
    /// Per-source override of the minimum inter-request interval.
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
    /// Per-source override of the token-bucket burst allowance.
    #[serde(default)]
    pub burst: Option<u32>,
    /// Hard cap on candidates processed per polling cycle.
    #[serde(default = "SourceConfig::default_max_items")]
    pub max_items: usize,
}

impl SourceConfig {
    fn default_max_items() -> usize {
        35
    }

    /// Validate this source in isolation. Blank URL entries are ignored, as
    /// they are at discovery time. An error disables this source only.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.kind {
            SourceKind::Rss { feed_urls } => {
                check_urls(feed_urls)?;
            }
            SourceKind::Crawl {
                seed_urls,
                allow_regex,
                deny_regex,
                ..
            } => {
                check_urls(seed_urls)?;
                for pat in [allow_regex, deny_regex].into_iter().flatten() {
                    if regex::Regex::new(pat).is_err() {
                        return Err(ConfigError::BadPattern(pat.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_urls(urls: &[String]) -> Result<(), ConfigError> {
    let mut any = false;
    for u in urls.iter().filter(|u| !u.trim().is_empty()) {
        any = true;
        if url::Url::parse(u).is_err() {
            return Err(ConfigError::InvalidUrl(u.clone()));
        }
    }
    if !any {
        return Err(ConfigError::MissingEndpoint);
    }
    Ok(())
}

/// Tagged variant over discovery behavior; dispatched by `kind` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    Rss {
        feed_urls: Vec<String>,
    },
    Crawl {
        seed_urls: Vec<String>,
        #[serde(default = "default_crawl_depth")]
        depth: u32,
        #[serde(default)]
        allow_regex: Option<String>,
        #[serde(default)]
        deny_regex: Option<String>,
    },
}

fn default_crawl_depth() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("fintech-news-ingest/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 20,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Default per-source budget; individual sources may override interval/burst.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub min_interval_ms: u64,
    pub burst: u32,
    /// Ceiling for the adaptive failure multiplier on the interval.
    pub failure_multiplier_ceiling: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1_000,
            burst: 1,
            failure_multiplier_ceiling: 8.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Jitter as a fraction of the computed delay, applied as ± this fraction.
    pub jitter_frac: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_frac: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub max_links_per_seed: usize,
    pub scan_limit: usize,
    pub same_domain_only: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_links_per_seed: 35,
            scan_limit: 1_500,
            same_domain_only: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Articles with less body text than this are dropped as boilerplate.
    pub min_text_chars: usize,
    /// Body text is truncated past this many characters.
    pub max_text_chars: usize,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 120,
            max_text_chars: 8_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Title-similarity threshold for near-duplicate suppression.
    pub similarity_threshold: f64,
    /// Sliding window within which near-duplicates are checked.
    pub window_secs: u64,
    /// Identities older than this may be evicted to bound memory.
    pub retention_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            window_secs: 1_800,
            retention_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakingConfig {
    pub enabled: bool,
    pub min_score: f64,
    /// An article older than this is never flagged breaking.
    pub max_age_secs: u64,
}

impl Default for BreakingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_score: 0.55,
            max_age_secs: 3_600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Global cap on in-flight HTTP requests across all sources.
    pub max_in_flight_requests: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_in_flight_requests: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Bounded buffer between workers and the sink; oldest entries are
    /// dropped when the sink falls behind.
    pub buffer_capacity: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            shutdown_grace_secs: 5,
        }
    }
}
