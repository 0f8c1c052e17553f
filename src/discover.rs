// src/discover.rs
//! Link discovery from listing/seed pages. Heuristic-based: find `<a href>`
//! links, normalize them, filter obvious non-article URLs, rank the rest by
//! article-likeness. URL canonicalization (tracking-param stripping) lives
//! here because dedup identity uses the same rules.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredLink {
    pub url: String,
    pub title: Option<String>,
}

/// Filters applied while scanning a page for links.
pub struct LinkFilter<'a> {
    pub max_links: usize,
    pub scan_limit: usize,
    pub same_domain_only: bool,
    pub allow: Option<&'a Regex>,
    pub deny: Option<&'a Regex>,
}

const DENY_SUBSTRINGS: &[&str] = &[
    "/video/",
    "/live/",
    "/podcast",
    "/subscribe",
    "/signin",
    "/login",
    "/account",
    "javascript:",
];

const TRACKING_PARAM_PREFIXES: &[&str] = &["utm_"];

const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "guccounter",
    "guce_referrer",
    "guce_referrer_sig",
    "soc_src",
    "soc_trk",
    "cmpid",
];

const HUB_PATH_SUBSTRINGS: &[&str] = &[
    "/topic/",
    "/topics/",
    "/tag/",
    "/tags/",
    "/category/",
    "/categories/",
    "/section/",
    "/sections/",
    "/author/",
    "/authors/",
    "/search",
    "/quote/",
    "/quotes/",
    "/calendar/",
    "/screener/",
];

const SECTION_ROOTS: &[&str] = &["news", "business", "markets", "world", "finance"];

static DATE_IN_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/\d{4}/\d{2}/\d{2}/|/\d{4}-\d{2}-\d{2}/").expect("date-in-path regex")
});

static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));

fn is_tracking_param(key: &str) -> bool {
    let kl = key.to_ascii_lowercase();
    TRACKING_PARAM_PREFIXES.iter().any(|p| kl.starts_with(p))
        || TRACKING_PARAMS.contains(&kl.as_str())
}

/// Remove the fragment and common tracking params. Dedup identity depends on
/// this being stable for equivalent URLs.
pub fn strip_fragment_and_tracking(url: &mut Url) {
    url.set_fragment(None);
    let keep: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.set_query(None);
    if !keep.is_empty() {
        url.query_pairs_mut().extend_pairs(keep);
    }
}

/// Canonical string form of a URL for identity hashing: parsed (lowercases
/// scheme/host), tracking-stripped, trailing slash trimmed. `None` when the
/// input is not an absolute URL.
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if url.host_str().is_none() {
        return None;
    }
    strip_fragment_and_tracking(&mut url);
    Some(url.to_string().trim_end_matches('/').to_string())
}

pub fn same_domain(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(ha), Some(hb)) => ha.eq_ignore_ascii_case(hb),
        _ => false,
    }
}

fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let hl = href.to_ascii_lowercase();
    if hl.starts_with("mailto:") || hl.starts_with("tel:") {
        return None;
    }
    base.join(href).ok()
}

pub fn looks_like_article_url(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    if DATE_IN_PATH_RE.is_match(&path) {
        return true;
    }
    if path.ends_with(".html") || path.ends_with(".htm") {
        return true;
    }
    if path.contains("/article/") {
        return true;
    }
    if path.contains("/news/") && path.split('/').count() >= 4 {
        return true;
    }
    false
}

fn is_hub_or_nav(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    HUB_PATH_SUBSTRINGS.iter().any(|s| path.contains(s))
}

fn is_section_root(url: &Url) -> bool {
    let segs: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
    segs.len() == 1 && SECTION_ROOTS.contains(&segs[0].to_ascii_lowercase().as_str())
}

/// Rank a candidate by how article-like its URL (and anchor text) looks.
/// Listing pages, hubs and section roots sink; dated slugs rise.
fn score_candidate(seed: &Url, url: &Url, title: Option<&str>) -> f64 {
    let path = url.path().to_ascii_lowercase();
    let mut score = 0.0;

    let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    score += (segs.len().min(8) as f64) * 0.4;

    if is_section_root(url) {
        score -= 10.0;
    }
    if looks_like_article_url(url) {
        score += 8.0;
    }
    if DATE_IN_PATH_RE.is_match(&path) {
        score += 4.0;
    }
    if path.ends_with(".html") || path.ends_with(".htm") {
        score += 2.0;
    }
    if segs.last().is_some_and(|last| last.contains('-')) {
        score += 1.5;
    }
    if is_hub_or_nav(url) {
        score -= 8.0;
    }
    if path == "/" || path.is_empty() {
        score -= 10.0;
    }
    if url.as_str().trim_end_matches('/') == seed.as_str().trim_end_matches('/') {
        score -= 10.0;
    }
    if let Some(t) = title {
        let t = t.trim();
        if t.len() >= 16 {
            score += 0.6;
        } else if t.len() <= 5 {
            score -= 0.6;
        }
    }
    if url.query().is_some() {
        score -= 0.5;
    }
    score
}

/// Extract candidate article links from a listing/home page, best first.
pub fn discover_links(seed: &Url, html: &str, filter: &LinkFilter<'_>) -> Vec<DiscoveredLink> {
    let doc = Html::parse_document(html);

    let mut candidates: Vec<(f64, DiscoveredLink)> = Vec::new();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

    let mut scanned = 0usize;
    for element in doc.select(&ANCHOR_SELECTOR) {
        if filter.scan_limit > 0 && scanned >= filter.scan_limit {
            break;
        }
        scanned += 1;

        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(mut url) = resolve_href(seed, href) else {
            continue;
        };
        strip_fragment_and_tracking(&mut url);

        let url_l = url.as_str().to_ascii_lowercase();
        if DENY_SUBSTRINGS.iter().any(|s| url_l.contains(s)) {
            continue;
        }
        if filter.same_domain_only && !same_domain(seed, &url) {
            continue;
        }
        if filter.deny.is_some_and(|re| re.is_match(url.as_str())) {
            continue;
        }
        if let Some(re) = filter.allow {
            if !re.is_match(url.as_str()) {
                continue;
            }
        }
        if url.path() == "/" || url.path().is_empty() || is_section_root(&url) {
            continue;
        }
        if !seen.insert(url_l) {
            continue;
        }

        let title = {
            let t = element.text().collect::<Vec<_>>().join(" ");
            let t = t.split_whitespace().collect::<Vec<_>>().join(" ");
            if t.is_empty() { None } else { Some(t) }
        };
        let score = score_candidate(seed, &url, title.as_deref());
        candidates.push((
            score,
            DiscoveredLink {
                url: url.to_string(),
                title,
            },
        ));
    }

    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    candidates
        .into_iter()
        .take(filter.max_links)
        .map(|(_, l)| l)
        .collect()
}
