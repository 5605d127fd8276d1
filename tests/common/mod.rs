// tests/common/mod.rs
//
// Shared in-process harness: in-memory SQLite, memory cache, fixture feeds
// and a scripted oracle. Nothing here touches the network.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use tower::ServiceExt as _;

use moodlight_sentiment::cache::MemoryCache;
use moodlight_sentiment::config::AppConfig;
use moodlight_sentiment::history::HistoryStore;
use moodlight_sentiment::ingest::config::FeedRegistry;
use moodlight_sentiment::ingest::providers::rss::RssFetcher;
use moodlight_sentiment::ingest::types::FeedSource;
use moodlight_sentiment::scoring::oracle::MockOracle;
use moodlight_sentiment::{Collaborators, Services};

pub const BODY_LIMIT: usize = 1024 * 1024;

pub fn rss(titles: &[(&str, &str)]) -> String {
    let items: String = titles
        .iter()
        .map(|(t, l)| format!("<item><title>{t}</title><link>{l}</link></item>"))
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title>{items}</channel></rss>"#)
}

pub fn registry() -> FeedRegistry {
    FeedRegistry::new(vec![
        FeedSource::new("Alpha", "https://alpha.test/rss"),
        FeedSource::new("Beta", "https://beta.test/rss"),
        FeedSource::new("Gamma", "https://gamma.test/rss"),
    ])
}

/// Three feeds, one headline each by default; Beta repeats Alpha's link.
pub fn fetcher() -> RssFetcher {
    RssFetcher::from_fixtures([
        (
            "Alpha",
            rss(&[("Forscher melden Durchbruch", "https://alpha.test/1")]),
        ),
        (
            "Beta",
            rss(&[
                ("Forscher melden Durchbruch (Kopie)", "https://alpha.test/1"),
                ("Hochwasser im Norden", "https://beta.test/2"),
            ]),
        ),
        (
            "Gamma",
            rss(&[("Bundestag vertagt Sitzung", "https://gamma.test/3")]),
        ),
    ])
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        ..AppConfig::default()
    }
}

pub async fn services_with(scores: Vec<f64>, fetcher: RssFetcher) -> Services {
    let store = HistoryStore::in_memory().await.expect("in-memory store");
    Services::assemble(
        test_config(),
        Arc::new(store),
        Collaborators {
            fetcher: Arc::new(fetcher),
            oracle: Arc::new(MockOracle::fixed(scores)),
            oracle_timeout: Duration::from_secs(5),
            cache_backend: Arc::new(MemoryCache::new()),
            registry: registry(),
        },
    )
}

pub async fn services(scores: Vec<f64>) -> Services {
    services_with(scores, fetcher()).await
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.expect("router response");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, headers, bytes)
}

pub async fn get_json(app: &Router, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, HeaderMap, Json) {
    let mut b = Request::builder().method("GET").uri(uri);
    for (k, v) in headers {
        b = b.header(*k, *v);
    }
    let req = b.body(Body::empty()).expect("build request");
    let (status, headers, bytes) = send(app, req).await;
    let json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, headers, json)
}

pub async fn post_json(app: &Router, uri: &str, body: Option<Json>) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(v) => Body::from(serde_json::to_vec(&v).expect("serialize")),
            None => Body::empty(),
        })
        .expect("build request");
    let (status, _, bytes) = send(app, req).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Json::Null))
}

pub fn cache_header(headers: &HeaderMap) -> String {
    headers
        .get("X-Cache")
        .expect("X-Cache header must be present")
        .to_str()
        .expect("ascii header")
        .to_string()
}
