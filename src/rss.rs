// src/rss.rs
//! RSS feed parsing. One candidate per `<item>`, carrying whatever inline
//! title/summary/timestamp the feed supplies.

use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::error::FetchError;
use crate::source::Candidate;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// Feeds disagree on date formats; try RFC 2822 first (the RSS norm), then
/// RFC 3339. Unknown formats yield `None` rather than an error.
fn parse_pub_date(ts: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = OffsetDateTime::parse(ts, &Rfc2822) {
        let unix = dt.to_offset(UtcOffset::UTC).unix_timestamp();
        return DateTime::from_timestamp(unix, 0);
    }
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a feed payload into candidates. Items without a link are skipped;
/// a payload that is not RSS at all is a `Parse` error.
pub fn parse_feed(source: &str, xml: &str, max_items: usize) -> Result<Vec<Candidate>, FetchError> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss =
        from_str(&xml_clean).map_err(|e| FetchError::Parse(format!("rss: {e}")))?;

    let mut out = Vec::with_capacity(rss.channel.item.len().min(max_items));
    for it in rss.channel.item.into_iter().take(max_items) {
        let Some(link) = it.link.filter(|l| !l.trim().is_empty()) else {
            continue;
        };
        out.push(Candidate {
            source: source.to_string(),
            url: link.trim().to_string(),
            title: it.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            summary: it.description.filter(|d| !d.trim().is_empty()),
            published_at: it.pub_date.as_deref().and_then(parse_pub_date),
        });
    }
    Ok(out)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example Markets</title>
    <item>
      <title>Central bank holds rates steady</title>
      <link>https://example.test/news/2024/05/06/rates-steady.html</link>
      <pubDate>Mon, 06 May 2024 13:15:00 GMT</pubDate>
      <description>Policymakers left the benchmark rate unchanged.</description>
    </item>
    <item>
      <title>Linkless item</title>
      <pubDate>Mon, 06 May 2024 13:20:00 GMT</pubDate>
    </item>
    <item>
      <title>Second story</title>
      <link>https://example.test/news/2024/05/06/second.html</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_items_and_skips_linkless() {
        let out = parse_feed("example", FEED, 10).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].source, "example");
        assert_eq!(
            out[0].title.as_deref(),
            Some("Central bank holds rates steady")
        );
        assert!(out[0].published_at.is_some());
        assert!(out[1].published_at.is_none());
    }

    #[test]
    fn respects_max_items() {
        let out = parse_feed("example", FEED, 1).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_feed("example", "<html>not a feed</html>", 10).unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[test]
    fn rfc3339_dates_are_accepted() {
        assert!(parse_pub_date("2024-05-06T13:15:00Z").is_some());
        assert!(parse_pub_date("Mon, 06 May 2024 13:15:00 GMT").is_some());
        assert!(parse_pub_date("yesterday-ish").is_none());
    }
}
