// tests/api_current.rs
//
// Current-mood read path over the real router.
//
// Covered:
// - 503 "not ready" before the first committed cycle (and on the legacy endpoint)
// - MISS then HIT with identical payloads
// - a committed cycle invalidates the cache; the next read reflects it
// - device tracking via X-Device-* headers
// - admin cache clear
// - an empty collection cycle is served as data, not as "not ready"

mod common;

use common::*;
use moodlight_sentiment::history::SnapshotLog;
use moodlight_sentiment::ingest::providers::rss::RssFetcher;
use moodlight_sentiment::scheduler::CycleOutcome;
use serde_json::json;
use shuttle_axum::axum::http::StatusCode;

#[tokio::test]
async fn current_is_unavailable_until_first_cycle() {
    let svc = services(vec![0.5, -0.5, 0.1]).await;
    let app = svc.router(None, None);

    let (status, _, body) = get_json(&app, "/api/moodlight/current", &[]).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "no sentiment data available");

    let (status, _, body) = get_json(&app, "/api/news/total_sentiment", &[]).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["headlines_analyzed_count"], 0);

    let (status, _, _) = get_json(&app, "/api/moodlight/trend", &[]).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn miss_then_hit_then_invalidated_by_cycle() {
    let svc = services(vec![0.6, 0.6, 0.6]).await;
    let app = svc.router(None, None);

    let first = svc.pipeline.run_cycle().await;
    assert!(matches!(first, CycleOutcome::Committed { .. }));

    let (s1, h1, b1) = get_json(&app, "/api/moodlight/current", &[]).await;
    assert_eq!(s1, StatusCode::OK);
    assert_eq!(cache_header(&h1), "MISS");
    assert_eq!(b1["status"], "success");
    assert_eq!(b1["cached"], false);
    assert_eq!(b1["next_update_minutes"], 30);
    assert_eq!(b1["headlines_analyzed"], 3);

    let (_, h2, b2) = get_json(&app, "/api/moodlight/current", &[]).await;
    assert_eq!(cache_header(&h2), "HIT");
    assert_eq!(b1, b2);

    let second = svc.pipeline.run_cycle().await;
    let CycleOutcome::Committed { snapshot, .. } = second else {
        panic!("second cycle should commit");
    };

    let (_, h3, b3) = get_json(&app, "/api/moodlight/current", &[]).await;
    assert_eq!(cache_header(&h3), "MISS");
    assert_eq!(b3["timestamp"], snapshot.timestamp.to_rfc3339());

    let (_, h4, _) = get_json(&app, "/api/moodlight/current", &[]).await;
    assert_eq!(cache_header(&h4), "HIT");
}

#[tokio::test]
async fn payload_matches_latest_snapshot() {
    // 0.6 x3 → base 0.6 → scaled 2.88 → clamps to 1.0
    let svc = services(vec![0.6, 0.6, 0.6]).await;
    let app = svc.router(None, None);
    svc.pipeline.run_cycle().await;

    let latest = svc.store.latest().await.unwrap().unwrap();
    assert_eq!(latest.score, 1.0);
    assert_eq!(latest.source_count, 3);

    let (_, _, body) = get_json(&app, "/api/moodlight/current", &[]).await;
    assert_eq!(body["sentiment"], 1.0);
    assert_eq!(body["category"], "very_positive");

    let (status, _, legacy) = get_json(&app, "/api/news/total_sentiment", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(legacy["total_sentiment"], 1.0);
    assert_eq!(legacy["headlines_analyzed_count"], 3);
}

#[tokio::test]
async fn devices_are_tracked_from_headers() {
    let svc = services(vec![0.0, 0.0, 0.0]).await;
    let app = svc.router(None, None);
    svc.pipeline.run_cycle().await;

    let headers = [
        ("X-Device-ID", "lamp-42"),
        ("X-Device-Name", "Living room"),
        ("X-Firmware-Version", "2.1.0"),
    ];
    get_json(&app, "/api/moodlight/current", &headers).await;
    get_json(&app, "/api/moodlight/current", &[("X-Device-ID", "lamp-42")]).await;
    get_json(&app, "/api/moodlight/current", &[("X-Device-ID", "unknown")]).await;

    let (status, _, body) = get_json(&app, "/api/moodlight/devices", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    let dev = &body["devices"][0];
    assert_eq!(dev["device_id"], "lamp-42");
    assert_eq!(dev["device_name"], "Living room");
    assert_eq!(dev["total_requests"], 2);
    assert_eq!(dev["online"], true);

    let (_, _, stats) = get_json(&app, "/api/moodlight/stats", &[]).await;
    assert_eq!(stats["total_devices"], 1);
    assert_eq!(stats["active_devices_24h"], 1);
    assert_eq!(stats["total_analyses"], 1);
}

#[tokio::test]
async fn admin_cache_clear_forces_a_miss() {
    let svc = services(vec![0.2, 0.2, 0.2]).await;
    let app = svc.router(None, None);
    svc.pipeline.run_cycle().await;

    get_json(&app, "/api/moodlight/current", &[]).await;
    let (_, h, _) = get_json(&app, "/api/moodlight/current", &[]).await;
    assert_eq!(cache_header(&h), "HIT");

    let (status, body) = post_json(&app, "/api/moodlight/cache/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success", "message": "cache cleared"}));

    let (_, h, _) = get_json(&app, "/api/moodlight/current", &[]).await;
    assert_eq!(cache_header(&h), "MISS");

    let (status, _) = post_json(&app, "/api/moodlight/cache/clear?scope=all", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, h, _) = get_json(&app, "/api/moodlight/current", &[]).await;
    assert_eq!(cache_header(&h), "MISS");
}

#[tokio::test]
async fn empty_cycle_is_served_not_unavailable() {
    let feeds = RssFetcher::from_fixtures([
        ("Alpha", rss(&[])),
        ("Beta", rss(&[])),
        ("Gamma", rss(&[])),
    ]);
    let svc = services_with(vec![], feeds).await;
    let app = svc.router(None, None);
    assert!(matches!(svc.pipeline.run_cycle().await, CycleOutcome::Committed { .. }));

    let (status, _, body) = get_json(&app, "/api/moodlight/current", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["headlines_analyzed"], 0);
    assert_eq!(body["sentiment"], 0.0);
    assert_eq!(body["category"], "neutral");
}

#[tokio::test]
async fn health_is_ok() {
    let svc = services(vec![]).await;
    let app = svc.router(None, None);
    let req = shuttle_axum::axum::http::Request::builder()
        .uri("/health")
        .body(shuttle_axum::axum::body::Body::empty())
        .unwrap();
    let (status, _, bytes) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(bytes).unwrap(), "ok");
}
