// src/ingest/providers/rss.rs
use async_trait::async_trait;
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::CollectionError;
use crate::ingest::types::{FeedSource, RawEntry, SourceFetcher};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Clean a feed title: decode HTML entities, strip tags, fold whitespace.
pub fn normalize_title(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();
    let stripped = RE_TAGS.replace_all(&decoded, "");
    let folded = RE_WS.replace_all(&stripped, " ");
    let mut out = folded.trim().to_string();
    if out.chars().count() > 500 {
        out = out.chars().take(500).collect();
    }
    out
}

/// Parse an RSS 2.0 document into raw entries, in document order.
pub fn parse_rss(source_name: &str, xml: &str) -> Result<Vec<RawEntry>, CollectionError> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).map_err(|e| CollectionError::Malformed {
        source_name: source_name.to_string(),
        message: e.to_string(),
    })?;

    Ok(rss
        .channel
        .item
        .into_iter()
        .map(|it| RawEntry {
            title: it.title.as_deref().map(normalize_title),
            link: it.link.map(|l| l.trim().to_string()),
        })
        .collect())
}

/// RSS fetcher over HTTP, or over in-memory fixtures keyed by source name.
pub struct RssFetcher {
    mode: Mode,
}

enum Mode {
    Fixture(HashMap<String, String>),
    Http {
        client: reqwest::Client,
        timeout: Duration,
    },
}

impl RssFetcher {
    pub fn http(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("moodlight-sentiment/0.1")
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            mode: Mode::Http { client, timeout },
        })
    }

    /// Serve documents from memory; sources without a fixture fail as HTTP errors.
    pub fn from_fixtures<I, K, V>(fixtures: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            mode: Mode::Fixture(
                fixtures
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl SourceFetcher for RssFetcher {
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<RawEntry>, CollectionError> {
        match &self.mode {
            Mode::Fixture(map) => match map.get(&source.name) {
                Some(xml) => parse_rss(&source.name, xml),
                None => Err(CollectionError::Http {
                    source_name: source.name.clone(),
                    message: "no fixture".to_string(),
                }),
            },
            Mode::Http { client, timeout } => {
                let resp = client.get(&source.url).send().await.map_err(|e| {
                    if e.is_timeout() {
                        CollectionError::Timeout {
                            source_name: source.name.clone(),
                            after: *timeout,
                        }
                    } else {
                        CollectionError::Http {
                            source_name: source.name.clone(),
                            message: e.to_string(),
                        }
                    }
                })?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(CollectionError::Http {
                        source_name: source.name.clone(),
                        message: format!("status {status}"),
                    });
                }
                let body = resp.text().await.map_err(|e| CollectionError::Http {
                    source_name: source.name.clone(),
                    message: e.to_string(),
                })?;
                parse_rss(&source.name, &body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&bdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <item>
      <title>  Bundestag beschließt Haushalt&nbsp;2025 </title>
      <link>https://example.test/a</link>
    </item>
    <item>
      <title><![CDATA[<b>Forscher</b> melden Durchbruch]]></title>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_titles_and_links_in_order() {
        let entries = parse_rss("Test", FEED).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].link.as_deref(), Some("https://example.test/a"));
        assert_eq!(entries[1].link, None);
        assert_eq!(entries[1].title.as_deref(), Some("Forscher melden Durchbruch"));
    }

    #[test]
    fn malformed_xml_is_a_collection_error() {
        let err = parse_rss("Bad", "<rss><channel>").unwrap_err();
        assert!(matches!(err, CollectionError::Malformed { .. }));
    }

    #[test]
    fn empty_channel_is_ok() {
        let xml = r#"<rss version="2.0"><channel><title>x</title></channel></rss>"#;
        assert!(parse_rss("Empty", xml).unwrap().is_empty());
    }

    #[test]
    fn normalize_title_folds_whitespace_and_entities() {
        assert_eq!(normalize_title("  A&amp;B \n\t C "), "A&B C");
        assert_eq!(normalize_title("<i>x</i>"), "x");
    }

    #[tokio::test]
    async fn fixture_mode_fails_unknown_sources() {
        let f = RssFetcher::from_fixtures([("Test", FEED)]);
        let ok = f.fetch(&FeedSource::new("Test", "https://t")).await.unwrap();
        assert_eq!(ok.len(), 2);
        let err = f
            .fetch(&FeedSource::new("Other", "https://o"))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectionError::Http { .. }));
    }
}
