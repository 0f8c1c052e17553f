// src/source.rs
//! Source discovery. A `PreparedSource` is a validated `SourceConfig` with
//! its regexes compiled; its `discover` turns the source into one finite
//! sequence of candidates per polling cycle. Discovery failures are logged
//! per endpoint and never abort the cycle for other endpoints or sources.

use chrono::{DateTime, Utc};
use metrics::counter;
use regex::Regex;
use url::Url;

use crate::config::{CrawlConfig, SourceConfig, SourceKind};
use crate::discover::{discover_links, LinkFilter};
use crate::error::ConfigError;
use crate::fetcher::Fetcher;
use crate::rss;

/// A discovered but not-yet-fetched article reference.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub source: String,
    pub url: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum PreparedKind {
    Rss {
        feeds: Vec<Url>,
    },
    Crawl {
        seeds: Vec<Url>,
        depth: u32,
        allow: Option<Regex>,
        deny: Option<Regex>,
    },
}

#[derive(Debug)]
pub struct PreparedSource {
    pub name: String,
    pub max_items: usize,
    pub min_interval_ms: Option<u64>,
    pub burst: Option<u32>,
    kind: PreparedKind,
}

impl PreparedSource {
    /// Validate and compile one source. An error here disables this source
    /// only.
    pub fn prepare(cfg: &SourceConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let kind = match &cfg.kind {
            SourceKind::Rss { feed_urls } => PreparedKind::Rss {
                feeds: parse_urls(feed_urls)?,
            },
            SourceKind::Crawl {
                seed_urls,
                depth,
                allow_regex,
                deny_regex,
            } => PreparedKind::Crawl {
                seeds: parse_urls(seed_urls)?,
                depth: (*depth).max(1),
                allow: compile_opt(allow_regex)?,
                deny: compile_opt(deny_regex)?,
            },
        };
        Ok(Self {
            name: cfg.name.clone(),
            max_items: cfg.max_items,
            min_interval_ms: cfg.min_interval_ms,
            burst: cfg.burst,
            kind,
        })
    }

    /// Run one discovery pass. Always returns (possibly empty); endpoint
    /// errors are logged and skipped.
    pub async fn discover(&self, fetcher: &Fetcher, crawl_cfg: &CrawlConfig) -> Vec<Candidate> {
        match &self.kind {
            PreparedKind::Rss { feeds } => self.discover_rss(fetcher, feeds).await,
            PreparedKind::Crawl {
                seeds,
                depth,
                allow,
                deny,
            } => {
                self.discover_crawl(fetcher, crawl_cfg, seeds, *depth, allow.as_ref(), deny.as_ref())
                    .await
            }
        }
    }

    async fn discover_rss(&self, fetcher: &Fetcher, feeds: &[Url]) -> Vec<Candidate> {
        let mut out = Vec::new();
        for feed in feeds {
            if out.len() >= self.max_items {
                break;
            }
            let remaining = self.max_items - out.len();
            let body = match fetcher.fetch(&self.name, feed.as_str()).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(source = %self.name, feed = %feed, error = %e, "feed fetch failed");
                    counter!("discover_errors_total", "kind" => "rss").increment(1);
                    continue;
                }
            };
            match rss::parse_feed(&self.name, &body, remaining) {
                Ok(mut cands) => out.append(&mut cands),
                Err(e) => {
                    tracing::warn!(source = %self.name, feed = %feed, error = %e, "feed parse failed");
                    counter!("discover_errors_total", "kind" => "rss").increment(1);
                }
            }
        }
        out
    }

    async fn discover_crawl(
        &self,
        fetcher: &Fetcher,
        crawl_cfg: &CrawlConfig,
        seeds: &[Url],
        depth: u32,
        allow: Option<&Regex>,
        deny: Option<&Regex>,
    ) -> Vec<Candidate> {
        // Link-level cycle avoidance within this polling cycle only; article
        // dedup is the coordinator's job.
        let mut visited: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut out = Vec::new();

        let mut frontier: Vec<(Url, u32)> = seeds.iter().map(|u| (u.clone(), 0)).collect();
        for (seed, _) in &frontier {
            visited.insert(seed.as_str().to_string());
        }

        while let Some((page, level)) = frontier.pop() {
            if out.len() >= self.max_items {
                break;
            }
            let html = match fetcher.fetch(&self.name, page.as_str()).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(source = %self.name, url = %page, error = %e, "seed fetch failed");
                    counter!("discover_errors_total", "kind" => "crawl").increment(1);
                    continue;
                }
            };

            let filter = LinkFilter {
                max_links: crawl_cfg.max_links_per_seed,
                scan_limit: crawl_cfg.scan_limit,
                same_domain_only: crawl_cfg.same_domain_only,
                allow,
                deny,
            };
            for link in discover_links(&page, &html, &filter) {
                if !visited.insert(link.url.to_ascii_lowercase()) {
                    continue;
                }
                if out.len() < self.max_items {
                    out.push(Candidate {
                        source: self.name.clone(),
                        url: link.url.clone(),
                        title: link.title,
                        summary: None,
                        published_at: None,
                    });
                }
                // Listing-ish links may hide more articles one level down.
                if level + 1 < depth {
                    if let Ok(u) = Url::parse(&link.url) {
                        frontier.push((u, level + 1));
                    }
                }
            }
        }
        out
    }
}

fn parse_urls(raw: &[String]) -> Result<Vec<Url>, ConfigError> {
    raw.iter()
        .filter(|u| !u.trim().is_empty())
        .map(|u| Url::parse(u).map_err(|_| ConfigError::InvalidUrl(u.clone())))
        .collect()
}

fn compile_opt(pat: &Option<String>) -> Result<Option<Regex>, ConfigError> {
    match pat {
        Some(p) => Regex::new(p)
            .map(Some)
            .map_err(|_| ConfigError::BadPattern(p.clone())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rss_cfg(name: &str, feeds: Vec<&str>) -> SourceConfig {
        SourceConfig {
            name: name.into(),
            enabled: true,
            kind: SourceKind::Rss {
                feed_urls: feeds.into_iter().map(String::from).collect(),
            },
            min_interval_ms: None,
            burst: None,
            max_items: 35,
        }
    }

    #[test]
    fn prepare_accepts_valid_rss() {
        let prepared = PreparedSource::prepare(&rss_cfg("ok", vec!["https://example.test/rss"]));
        assert!(prepared.is_ok());
    }

    #[test]
    fn prepare_rejects_missing_endpoint() {
        let err = PreparedSource::prepare(&rss_cfg("empty", vec![""])).unwrap_err();
        assert_eq!(err, ConfigError::MissingEndpoint);
    }

    #[test]
    fn prepare_skips_blank_entries_among_valid_feeds() {
        let prepared = PreparedSource::prepare(&rss_cfg(
            "mixed",
            vec!["", "https://example.test/rss", "  "],
        ));
        assert!(prepared.is_ok());
    }

    #[test]
    fn prepare_rejects_bad_crawl_regex() {
        let cfg = SourceConfig {
            name: "crawler".into(),
            enabled: true,
            kind: SourceKind::Crawl {
                seed_urls: vec!["https://example.test/".into()],
                depth: 1,
                allow_regex: Some("(".into()),
                deny_regex: None,
            },
            min_interval_ms: None,
            burst: None,
            max_items: 35,
        };
        assert!(matches!(
            PreparedSource::prepare(&cfg),
            Err(ConfigError::BadPattern(_))
        ));
    }
}
