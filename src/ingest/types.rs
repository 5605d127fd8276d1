// src/ingest/types.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollectionError;

/// One entry as returned by a feed, before dedup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
}

/// A deduplicated headline pending scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub text: String,   // trimmed headline
    pub source: String, // e.g. "Tagesschau"
    pub link: Option<String>,
}

impl Item {
    /// Dedup identity: the link when present, otherwise the trimmed text.
    pub fn identity_key(&self) -> &str {
        self.link.as_deref().unwrap_or(&self.text)
    }
}

/// A named feed endpoint from the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

impl FeedSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Fetcher collaborator: one call per source per cycle.
///
/// Errors are reported per source and never abort the other sources.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<RawEntry>, CollectionError>;
    fn name(&self) -> &'static str;
}
