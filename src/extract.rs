// src/extract.rs
//! Readable-text extraction from article pages. Tag-density style heuristic:
//! prefer `<article>`, fall back to `<body>`, join paragraph-like blocks while
//! skipping nav/footer/script subtrees. Also hosts the login/paywall detector
//! used to drop pages whose extraction would be boilerplate.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static META_TITLE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        r#"meta[property="og:title"]"#,
        r#"meta[name="twitter:title"]"#,
        r#"meta[name="title"]"#,
    ]
    .iter()
    .map(|s| Selector::parse(s).expect("meta title selector"))
    .collect()
});

static H1_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("h1 selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("title selector"));
static ARTICLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article").expect("article selector"));
static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("body selector"));
static PARA_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p, h1, h2, h3, li").expect("paragraph selector"));
static PASSWORD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"input[type="password"]"#).expect("password selector"));

const NOISE_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "header", "aside",
];

static LOGIN_PAYWALL_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\bsign\s*in\b",
        r"\blog\s*in\b",
        r"\bsubscribe\b",
        r"\bsubscription\b",
        r"\bcreate\s+an?\s+account\b",
        r"\bstart\s+your\s+free\s+trial\b",
        r"\balready\s+a\s+subscriber\b",
        r"\byou\s+have\s+reached\s+your\s+limit\b",
        r"\baccess\s+denied\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("paywall regex"))
    .collect()
});

fn in_noise_subtree(el: &ElementRef<'_>) -> bool {
    el.ancestors().any(|node| {
        node.value()
            .as_element()
            .is_some_and(|e| NOISE_TAGS.contains(&e.name()))
    })
}

fn element_text(el: &ElementRef<'_>) -> String {
    let raw = el.text().collect::<Vec<_>>().join(" ");
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Best-effort title extraction: og/twitter meta, then `<h1>`, then `<title>`.
pub fn extract_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    for sel in META_TITLE_SELECTORS.iter() {
        if let Some(el) = doc.select(sel).next() {
            if let Some(content) = el.value().attr("content") {
                let t = content.trim();
                if !t.is_empty() {
                    return Some(t.to_string());
                }
            }
        }
    }
    if let Some(h1) = doc.select(&H1_SELECTOR).next() {
        let t = element_text(&h1);
        if !t.is_empty() {
            return Some(t);
        }
    }
    if let Some(title) = doc.select(&TITLE_SELECTOR).next() {
        let t = element_text(&title);
        if !t.is_empty() {
            return Some(t);
        }
    }
    None
}

/// Join paragraph-like content under `<article>` (or `<body>`), skipping
/// nav/footer/header/aside/script subtrees.
pub fn extract_main_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let root = doc
        .select(&ARTICLE_SELECTOR)
        .next()
        .or_else(|| doc.select(&BODY_SELECTOR).next());
    let Some(root) = root else {
        return String::new();
    };

    let mut parts: Vec<String> = Vec::new();
    for el in root.select(&PARA_SELECTOR) {
        if in_noise_subtree(&el) {
            continue;
        }
        let text = element_text(&el);
        if !text.is_empty() {
            parts.push(text);
        }
    }
    parts.join("\n").trim().to_string()
}

/// Convert an HTML snippet (e.g. an RSS summary) to plain text.
pub fn html_fragment_to_text(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    let raw = doc.root_element().text().collect::<Vec<_>>().join(" ");
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Conservative login/paywall detection, used only when extraction yielded
/// too little text to trust the page.
pub fn looks_like_login_or_paywall(html: &str) -> bool {
    let doc = Html::parse_document(html);

    if doc.select(&PASSWORD_SELECTOR).next().is_some() {
        return true;
    }

    let visible = extract_main_text(html).to_lowercase();
    if visible.is_empty() || visible.len() < 120 {
        // JS shells and blocked pages render almost nothing.
        return true;
    }
    if visible.contains("enable javascript") || visible.contains("enable cookies") {
        return true;
    }
    LOGIN_PAYWALL_RES.iter().any(|re| re.is_match(&visible))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <title>Fallback title - Site</title>
        <meta property="og:title" content="Fed holds rates at two-decade high">
      </head><body>
        <header><a href="/signin">Sign in</a></header>
        <nav><li>Markets</li><li>World</li></nav>
        <article>
          <h1>Fed holds rates at two-decade high</h1>
          <p>The Federal Reserve left its benchmark interest rate unchanged on
          Wednesday, keeping borrowing costs at a two-decade high while it
          waits for clearer signs that inflation is cooling.</p>
          <p>Chair Powell said the committee needs greater confidence before
          cutting rates.</p>
        </article>
        <footer><p>Terms of use. Subscribe to our newsletter.</p></footer>
      </body></html>"#;

    #[test]
    fn title_prefers_og_meta() {
        assert_eq!(
            extract_title(PAGE).as_deref(),
            Some("Fed holds rates at two-decade high")
        );
    }

    #[test]
    fn title_falls_back_to_h1_then_title() {
        let no_meta = "<html><body><h1>Only headline</h1></body></html>";
        assert_eq!(extract_title(no_meta).as_deref(), Some("Only headline"));
        let only_title = "<html><head><title>Doc title</title></head><body></body></html>";
        assert_eq!(extract_title(only_title).as_deref(), Some("Doc title"));
    }

    #[test]
    fn main_text_skips_nav_and_footer() {
        let text = extract_main_text(PAGE);
        assert!(text.contains("benchmark interest rate"));
        assert!(text.contains("Chair Powell"));
        assert!(!text.contains("Terms of use"));
        assert!(!text.contains("Markets\nWorld"));
    }

    #[test]
    fn fragment_to_text_strips_markup() {
        let t = html_fragment_to_text("<b>Oil&nbsp;jumps</b> after <i>supply</i> shock");
        assert_eq!(t, "Oil jumps after supply shock");
    }

    #[test]
    fn paywall_detection() {
        let wall = r#"<html><body><article>
            <p>Already a subscriber? Sign in to continue reading this story. Start
            your free trial today for unlimited access to market coverage.</p>
          </article></body></html>"#;
        assert!(looks_like_login_or_paywall(wall));

        let shell = "<html><body></body></html>";
        assert!(looks_like_login_or_paywall(shell));

        assert!(!looks_like_login_or_paywall(PAGE));
    }
}
