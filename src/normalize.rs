// src/normalize.rs
//! Candidate → canonical `Article`. Fetches the linked page when a candidate
//! carries no usable inline body, extracts readable text, normalizes it, and
//! derives the stable identity used for dedup.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::article::Article;
use crate::config::NormalizeConfig;
use crate::discover::canonical_url;
use crate::error::FetchError;
use crate::extract::{
    extract_main_text, extract_title, html_fragment_to_text, looks_like_login_or_paywall,
};
use crate::fetcher::Fetcher;
use crate::source::Candidate;

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("ws regex"));
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank regex"));

/// Normalize a title: entity decode, tag strip, quote normalization,
/// whitespace collapse, trailing punctuation trim.
pub fn normalize_title(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();
    out = RE_TAGS.replace_all(&out, "").to_string();
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    out = out.split_whitespace().collect::<Vec<_>>().join(" ");
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }
    if out.chars().count() > 300 {
        out = out.chars().take(300).collect();
    }
    out
}

/// Normalize body text, preserving paragraph breaks. Capped at `max_chars`.
pub fn normalize_body(s: &str, max_chars: usize) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();
    out = RE_WS.replace_all(&out, " ").to_string();
    out = RE_BLANK_LINES.replace_all(&out, "\n\n").to_string();
    out = out.trim().to_string();
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}

fn hex_prefix(digest: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// Canonical identity: hash of the canonicalized URL when the URL parses,
/// otherwise a composite over (source, normalized title, body prefix).
pub fn canonical_identity(url: &str, source: &str, title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    match canonical_url(url) {
        Some(canon) => {
            hasher.update(b"url:");
            hasher.update(canon.as_bytes());
        }
        None => {
            hasher.update(b"composite:");
            hasher.update(source.as_bytes());
            hasher.update(b"\n");
            hasher.update(title.as_bytes());
            hasher.update(b"\n");
            let prefix: String = body.chars().take(256).collect();
            hasher.update(prefix.as_bytes());
        }
    }
    hex_prefix(&hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    cfg: NormalizeConfig,
}

impl Normalizer {
    pub fn new(cfg: NormalizeConfig) -> Self {
        Self { cfg }
    }

    /// Produce an `Article` (keywords/score left for the scorer) or a
    /// classified error. `Parse` means the candidate is dropped, not retried.
    pub async fn normalize(
        &self,
        fetcher: &Fetcher,
        cand: &Candidate,
    ) -> Result<Article, FetchError> {
        let summary_text = cand
            .summary
            .as_deref()
            .map(|s| normalize_body(&html_fragment_to_text(s), self.cfg.max_text_chars))
            .filter(|s| !s.is_empty());

        let mut title = cand.title.as_deref().map(normalize_title).unwrap_or_default();

        // A substantial inline summary is enough; only fetch the page when
        // the feed gave us nothing to work with.
        let body = match &summary_text {
            Some(s) if s.chars().count() >= self.cfg.min_text_chars => s.clone(),
            _ => {
                match fetcher.fetch(&cand.source, &cand.url).await {
                    Ok(html) => {
                        if title.is_empty() {
                            if let Some(t) = extract_title(&html) {
                                title = normalize_title(&t);
                            }
                        }
                        let text =
                            normalize_body(&extract_main_text(&html), self.cfg.max_text_chars);
                        if text.chars().count() < self.cfg.min_text_chars
                            && looks_like_login_or_paywall(&html)
                        {
                            // Blocked page; the summary is the best we have.
                            summary_text.clone().ok_or_else(|| {
                                FetchError::Parse("login/paywall page with no summary".into())
                            })?
                        } else {
                            text
                        }
                    }
                    Err(e) => summary_text.clone().ok_or_else(|| {
                        FetchError::Parse(format!("no inline body and page unreachable: {e}"))
                    })?,
                }
            }
        };

        if body.chars().count() < self.cfg.min_text_chars {
            return Err(FetchError::Parse("empty or boilerplate content".into()));
        }
        if title.is_empty() {
            // Last resort: lead of the body, so dedup has something to chew on.
            title = body.chars().take(120).collect::<String>();
            if let Some(cut) = title.find('\n') {
                title.truncate(cut);
            }
        }

        let id = canonical_identity(&cand.url, &cand.source, &title, &body);
        Ok(Article {
            id,
            source: cand.source.clone(),
            title,
            body,
            published_at: cand.published_at,
            retrieved_at: Utc::now(),
            keywords: Vec::new(),
            score: 0.0,
            breaking: false,
            url: cand.url.clone(),
        })
    }
}
