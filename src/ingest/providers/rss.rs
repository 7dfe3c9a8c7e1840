// src/ingest/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::ingest::normalize_text;
use crate::ingest::types::{Candidate, SourceProvider};

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
    /// Comment count from `<slash:comments>`. quick-xml matches on the local
    /// name, which would collide with RSS 2.0 `<comments>` (a URL), so the
    /// scrub renames the element first.
    #[serde(rename = "slash_comments")]
    comment_count: Option<String>,
    /// Some aggregators put a score here.
    #[serde(rename = "score")]
    score: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

fn parse_count(s: Option<&str>) -> Option<f64> {
    s.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// A feed provider: items of one RSS channel, attributed to a configured provider name.
pub struct RssProvider {
    provider: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssProvider {
    /// Parse from an in-memory document (tests, offline runs).
    pub fn from_fixture(provider: impl Into<String>, xml: &str) -> Self {
        Self {
            provider: provider.into(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(provider: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            mode: Mode::Http {
                url: url.into(),
                client: reqwest::Client::new(),
            },
        }
    }

    fn parse(&self, s: &str, now: DateTime<Utc>) -> Result<Vec<Candidate>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean)
            .with_context(|| format!("parsing {} rss xml", self.provider))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let link = it.link.as_deref().unwrap_or_default().trim().to_string();
            // Validation happens at the boundary; only skip obviously empty entries here.
            if title.is_empty() && link.is_empty() {
                continue;
            }
            let discovered_at = it.pub_date.as_deref().and_then(parse_rfc2822).unwrap_or(now);

            let mut c = Candidate::new(self.provider.clone(), link, title, discovered_at)
                .with_summary(normalize_text(it.description.as_deref().unwrap_or_default()));
            if let Some(n) = parse_count(it.comment_count.as_deref()) {
                c = c.with_signal("comments", n);
            }
            if let Some(n) = parse_count(it.score.as_deref()) {
                c = c.with_signal("score", n);
            }
            out.push(c);
        }

        histogram!("pipeline_feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for RssProvider {
    async fn discover(&self) -> Result<Vec<Candidate>> {
        let now = Utc::now();
        match &self.mode {
            Mode::Fixture(s) => self.parse(s, now),
            Mode::Http { url, client } => {
                let body = match client.get(url).send().await {
                    Ok(resp) => resp
                        .error_for_status()
                        .with_context(|| format!("{} feed http status", self.provider))?
                        .text()
                        .await
                        .with_context(|| format!("{} feed http .text()", self.provider))?,
                    Err(e) => {
                        tracing::warn!(target: "ingest", error = ?e, provider = %self.provider, "feed http error");
                        counter!("pipeline_feed_http_errors_total").increment(1);
                        return Err(e).with_context(|| format!("{} feed http get()", self.provider));
                    }
                };
                self.parse(&body, now)
            }
        }
    }

    fn name(&self) -> &str {
        &self.provider
    }
}

/// quick-xml only knows the five XML entities; feeds often carry HTML ones.
/// Also gives `<slash:comments>` a name distinct from plain `<comments>`.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
        .replace("<slash:comments>", "<slash_comments>")
        .replace("</slash:comments>", "</slash_comments>")
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:slash="http://purl.org/rss/1.0/modules/slash/">
  <channel>
    <title>t</title>
    <item>
      <title>Tokio&nbsp;1.50 released</title>
      <link>https://tokio.rs/blog/1-50?utm_source=rss</link>
      <pubDate>Mon, 19 Oct 2026 08:00:00 +0000</pubDate>
      <description>&lt;p&gt;Faster &lt;b&gt;scheduler&lt;/b&gt;&lt;/p&gt;</description>
      <slash:comments>42</slash:comments>
    </item>
    <item>
      <title></title>
      <link></link>
    </item>
  </channel>
</rss>"#;

    #[tokio::test]
    async fn parses_items_dates_and_signals() {
        let p = RssProvider::from_fixture("hackernews", XML);
        let items = p.discover().await.unwrap();
        assert_eq!(items.len(), 1);
        let c = &items[0];
        assert_eq!(c.provider, "hackernews");
        assert_eq!(c.title, "Tokio 1.50 released");
        assert_eq!(c.summary, "Faster scheduler");
        assert_eq!(c.discovered_at.to_rfc3339(), "2026-10-19T08:00:00+00:00");
        assert_eq!(c.discussion(), 42.0);
    }

    #[tokio::test]
    async fn comment_count_survives_a_comments_link() {
        let xml = r#"<rss xmlns:slash="http://purl.org/rss/1.0/modules/slash/"><channel>
  <item>
    <title>Zed goes open source</title>
    <link>https://zed.dev/blog/open-source</link>
    <comments>https://news.ycombinator.com/item?id=1</comments>
    <slash:comments>310</slash:comments>
  </item>
  <item>
    <title>No counts here</title>
    <link>https://example.org/a</link>
    <comments>https://news.ycombinator.com/item?id=2</comments>
  </item>
</channel></rss>"#;
        let items = RssProvider::from_fixture("hackernews", xml).discover().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].discussion(), 310.0);
        assert_eq!(items[1].discussion(), 0.0);
    }

    #[tokio::test]
    async fn malformed_xml_is_an_error() {
        let p = RssProvider::from_fixture("reddit", "<rss><channel>");
        assert!(p.discover().await.is_err());
    }

    #[tokio::test]
    async fn unreachable_feed_is_an_error() {
        let p = RssProvider::from_url("reddit", "http://127.0.0.1:9/feed.xml");
        assert!(p.discover().await.is_err());
        assert_eq!(p.name(), "reddit");
    }
}
