// src/ingest/config.rs
//! Feed registry: which sources a cycle polls, in which order.
//!
//! The registry is immutable once built. Updates build a fresh registry and
//! swap the `Arc` inside [`RegistryHandle`], so a running cycle keeps the
//! snapshot it started with.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::ingest::types::FeedSource;

const ENV_PATH: &str = "FEEDS_CONFIG_PATH";

/// Ordered, validated list of feed sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRegistry {
    sources: Vec<FeedSource>,
}

impl FeedRegistry {
    /// Keep entries with a non-empty name and an `http(s)` URL; later
    /// duplicates of a name are dropped.
    pub fn new(sources: Vec<FeedSource>) -> Self {
        let mut out: Vec<FeedSource> = Vec::with_capacity(sources.len());
        for s in sources {
            let name = s.name.trim();
            let url = s.url.trim();
            if name.is_empty() || !is_valid_feed_url(url) {
                tracing::warn!(target: "ingest", name, url, "dropping invalid feed entry");
                continue;
            }
            if out.iter().any(|o| o.name == name) {
                continue;
            }
            out.push(FeedSource::new(name, url));
        }
        Self { sources: out }
    }

    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Built-in registry used when no config file is present.
    pub fn default_seed() -> Self {
        let feeds = [
            ("Zeit", "https://newsfeed.zeit.de/index"),
            ("Tagesschau", "https://www.tagesschau.de/xml/rss2"),
            ("Sueddeutsche", "https://rss.sueddeutsche.de/rss/Alles"),
            ("FAZ", "https://www.faz.net/rss/aktuell/"),
            ("Die Welt", "https://www.welt.de/feeds/latest.rss"),
            (
                "Handelsblatt",
                "https://www.handelsblatt.com/contentexport/feed/schlagzeilen",
            ),
            ("n-tv", "https://www.n-tv.de/rss"),
            ("Focus", "https://rss.focus.de/fol/XML/rss_folnews.xml"),
            ("Stern", "https://www.stern.de/feed/standard/alle-nachrichten/"),
            ("Telekom", "https://www.t-online.de/feed.rss"),
            ("TAZ", "https://taz.de/!p4608;rss/"),
            (
                "Deutschlandfunk",
                "https://www.deutschlandfunk.de/nachrichten-100.rss",
            ),
        ];
        Self::new(
            feeds
                .iter()
                .map(|(n, u)| FeedSource::new(*n, *u))
                .collect(),
        )
    }
}

pub fn is_valid_feed_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Shared handle to the current registry snapshot.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    inner: Arc<RwLock<Arc<FeedRegistry>>>,
}

impl RegistryHandle {
    pub fn new(registry: FeedRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    /// The registry as of now. Later `replace` calls don't affect it.
    pub fn snapshot(&self) -> Arc<FeedRegistry> {
        match self.inner.read() {
            Ok(g) => Arc::clone(&g),
            Err(poison) => Arc::clone(&poison.into_inner()),
        }
    }

    pub fn replace(&self, registry: FeedRegistry) {
        let fresh = Arc::new(registry);
        match self.inner.write() {
            Ok(mut g) => *g = fresh,
            Err(poison) => *poison.into_inner() = fresh,
        }
    }
}

/// Load a registry from an explicit path. Supports TOML or JSON formats.
pub fn load_registry_from(path: &Path) -> Result<FeedRegistry> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed registry from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_registry(&content, ext.as_str())
}

/// Load the registry using env var + fallbacks:
/// 1) $FEEDS_CONFIG_PATH
/// 2) config/feeds.toml
/// 3) config/feeds.json
/// 4) built-in default seed
pub fn load_registry_default() -> Result<FeedRegistry> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_registry_from(&pb);
        } else {
            return Err(anyhow!("FEEDS_CONFIG_PATH points to non-existent path"));
        }
    }
    for candidate in ["config/feeds.toml", "config/feeds.json"] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return load_registry_from(&p);
        }
    }
    Ok(FeedRegistry::default_seed())
}

fn parse_registry(s: &str, hint_ext: &str) -> Result<FeedRegistry> {
    let try_toml = hint_ext == "toml" || s.contains("[[feeds]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported feed registry format"))
}

fn parse_toml(s: &str) -> Result<FeedRegistry> {
    #[derive(serde::Deserialize)]
    struct TomlFeeds {
        feeds: Vec<FeedSource>,
    }
    let v: TomlFeeds = toml::from_str(s)?;
    Ok(FeedRegistry::new(v.feeds))
}

/// JSON object `{ "name": "url", ... }`, or `{ "feeds": { ... } }`.
/// Key order is preserved.
fn parse_json(s: &str) -> Result<FeedRegistry> {
    let v: serde_json::Value = serde_json::from_str(s)?;
    let obj = match v.get("feeds") {
        Some(inner) => inner.as_object(),
        None => v.as_object(),
    }
    .ok_or_else(|| anyhow!("feed registry JSON must be an object"))?;
    registry_from_json_map(obj)
}

/// Build a registry from a JSON `name -> url` map; non-string URLs are dropped.
pub fn registry_from_json_map(
    obj: &serde_json::Map<String, serde_json::Value>,
) -> Result<FeedRegistry> {
    let sources = obj
        .iter()
        .filter_map(|(name, url)| url.as_str().map(|u| FeedSource::new(name.as_str(), u)))
        .collect();
    Ok(FeedRegistry::new(sources))
}
