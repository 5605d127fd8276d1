//! HTTP read path. Handlers only read the cache and the snapshot log; the
//! scoring oracle is never called from here.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shuttle_axum::axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::cache::{round_to, CacheCoordinator};
use crate::classify::Trend;
use crate::error::ServeError;
use crate::history::{DeviceInfo, HistoryStore, SnapshotLog};
use crate::ingest::config::{registry_from_json_map, RegistryHandle};
use crate::scheduler::SchedulerHandle;

pub const CACHE_HEADER: &str = "X-Cache";
const DEFAULT_HISTORY_LIMIT: u32 = 1000;
const DEFAULT_DEVICE_HOURS: i64 = 2;
const ONLINE_MINUTES: f64 = 60.0;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheCoordinator>,
    pub store: Arc<HistoryStore>,
    pub registry: RegistryHandle,
    pub scheduler: Option<Arc<SchedulerHandle>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/moodlight/current", get(current))
        .route("/api/moodlight/history", get(history))
        .route("/api/moodlight/trend", get(trend))
        .route("/api/moodlight/stats", get(stats))
        .route("/api/moodlight/devices", get(devices))
        .route("/api/moodlight/cache/clear", post(cache_clear))
        .route("/api/news/total_sentiment", get(total_sentiment))
        .route("/api/feedconfig", post(feed_config))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    match &state.scheduler {
        Some(s) if !s.is_alive() => {
            (StatusCode::SERVICE_UNAVAILABLE, "scheduler stopped").into_response()
        }
        _ => "ok".into_response(),
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn device_from_headers(headers: &HeaderMap) -> Option<DeviceInfo> {
    let device_id = header_str(headers, "X-Device-ID")?;
    if device_id.eq_ignore_ascii_case("unknown") {
        return None;
    }
    let ip_address = header_str(headers, "X-Forwarded-For")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .filter(|v| !v.is_empty());
    Some(DeviceInfo {
        device_id,
        device_name: header_str(headers, "X-Device-Name"),
        firmware_version: header_str(headers, "X-Firmware-Version"),
        ip_address,
        ..Default::default()
    })
}

async fn current(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ServeError> {
    let t0 = std::time::Instant::now();
    let device = device_from_headers(&headers);

    let (payload, status) = state.cache.current_payload().await?;

    if let Some(dev) = &device {
        if let Err(e) = state.store.register_device(dev, Utc::now()).await {
            tracing::error!(error = %e, device = %dev.device_id, "device tracking failed");
        }
    }
    tracing::info!(
        device = device.as_ref().map(|d| d.device_id.as_str()).unwrap_or("unknown"),
        cache = status.as_str(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "current mood served"
    );

    let mut resp = Json(payload).into_response();
    resp.headers_mut()
        .insert(CACHE_HEADER, HeaderValue::from_static(status.as_str()));
    Ok(resp)
}

async fn total_sentiment(State(state): State<AppState>) -> Response {
    match state.store.latest().await {
        Ok(Some(s)) => Json(json!({
            "status": "success",
            "total_sentiment": s.score,
            "headlines_analyzed_count": s.analyzed_count,
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "message": ServeError::NotReady.to_string(),
                "total_sentiment": 0.0,
                "headlines_analyzed_count": 0,
            })),
        )
            .into_response(),
        Err(e) => ServeError::from(e).into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub hours: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
struct HistoryRow {
    timestamp: String,
    sentiment_score: f64,
    category: String,
    headlines_analyzed: usize,
}

fn parse_ts(name: &str, raw: &str) -> Result<DateTime<Utc>, ServeError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| ServeError::BadRequest(format!("invalid '{name}' timestamp (RFC 3339 expected)")))
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ServeError> {
    raw.trim()
        .parse()
        .map_err(|_| ServeError::BadRequest(format!("invalid '{name}' value")))
}

/// `now` minus `hours`, or 400 when the offset leaves chrono's range.
pub fn hours_before(now: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>, ServeError> {
    Duration::try_hours(hours)
        .and_then(|d| now.checked_sub_signed(d))
        .ok_or_else(|| ServeError::BadRequest(format!("'hours' out of range: {hours}")))
}

/// Resolve the query window. `hours` (when positive) wins over `from`/`to`;
/// missing bounds default to the last 24 hours.
pub fn history_window(
    p: &HistoryParams,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>, u32), ServeError> {
    let limit = match &p.limit {
        Some(l) => parse_num::<u32>("limit", l)?,
        None => DEFAULT_HISTORY_LIMIT,
    };
    let hours = match &p.hours {
        Some(h) => Some(parse_num::<i64>("hours", h)?).filter(|h| *h > 0),
        None => None,
    };
    if let Some(h) = hours {
        return Ok((hours_before(now, h)?, now, limit));
    }
    let from = match &p.from {
        Some(f) => parse_ts("from", f)?,
        None => now - Duration::hours(24),
    };
    let to = match &p.to {
        Some(t) => parse_ts("to", t)?,
        None => now,
    };
    Ok((from, to, limit))
}

async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, ServeError> {
    let (from, to, limit) = history_window(&params, Utc::now())?;
    let rows = state.store.range(from, to, limit).await?;
    let data: Vec<HistoryRow> = rows
        .into_iter()
        .map(|s| HistoryRow {
            timestamp: s.timestamp.to_rfc3339(),
            sentiment_score: s.score,
            category: s.category.as_str().to_string(),
            headlines_analyzed: s.analyzed_count,
        })
        .collect();
    Ok(Json(json!({ "count": data.len(), "data": data })))
}

async fn trend(State(state): State<AppState>) -> Result<Json<Value>, ServeError> {
    let now = Utc::now();
    let latest = state.store.latest().await?.ok_or(ServeError::NotReady)?;
    let avg_24h = state
        .store
        .average_since(now - Duration::hours(24))
        .await?
        .unwrap_or(0.0);
    let avg_7d = state
        .store
        .average_since(now - Duration::days(7))
        .await?
        .unwrap_or(0.0);
    let change_24h = latest.score - avg_24h;

    Ok(Json(json!({
        "status": "success",
        "current": round_to(latest.score, 2),
        "avg_24h": round_to(avg_24h, 2),
        "avg_7d": round_to(avg_7d, 2),
        "change_24h": round_to(change_24h, 2),
        "trend": Trend::from_change(change_24h),
        "category": latest.category,
        "timestamp": latest.timestamp.to_rfc3339(),
    })))
}

async fn stats(State(state): State<AppState>) -> Result<Json<Value>, ServeError> {
    let s = state.store.statistics(Utc::now()).await?;
    Ok(Json(json!({
        "status": "success",
        "total_devices": s.total_devices,
        "active_devices_24h": s.active_devices_24h,
        "total_analyses": s.total_analyses,
        "last_update": s.last_update.map(|t| t.to_rfc3339()),
        "avg_sentiment_24h": round_to(s.avg_sentiment_24h.unwrap_or(0.0), 3),
        "avg_sentiment_7d": round_to(s.avg_sentiment_7d.unwrap_or(0.0), 3),
    })))
}

#[derive(Debug, Deserialize)]
struct DevicesParams {
    hours: Option<i64>,
}

async fn devices(
    State(state): State<AppState>,
    Query(params): Query<DevicesParams>,
) -> Result<Json<Value>, ServeError> {
    let now = Utc::now();
    let hours = params.hours.unwrap_or(DEFAULT_DEVICE_HOURS).max(0);
    let rows = state
        .store
        .active_devices(hours_before(now, hours)?, now)
        .await?;
    let devices: Vec<Value> = rows
        .into_iter()
        .map(|d| {
            json!({
                "device_id": d.device_id,
                "device_name": d.device_name,
                "firmware_version": d.firmware_version,
                "location": d.location,
                "last_seen": d.last_seen.to_rfc3339(),
                "total_requests": d.total_requests,
                "minutes_since_last_seen": round_to(d.minutes_since_last_seen, 1),
                "online": d.minutes_since_last_seen < ONLINE_MINUTES,
            })
        })
        .collect();
    Ok(Json(json!({
        "status": "success",
        "count": devices.len(),
        "devices": devices,
    })))
}

#[derive(Debug, Deserialize)]
struct ClearParams {
    scope: Option<String>,
}

async fn cache_clear(
    State(state): State<AppState>,
    Query(params): Query<ClearParams>,
) -> Result<Json<Value>, ServeError> {
    let flush_all = params.scope.as_deref() == Some("all");
    let res = if flush_all {
        state.cache.flush_all().await
    } else {
        state.cache.invalidate().await
    };
    res.map_err(|e| ServeError::Internal(e.to_string()))?;
    tracing::info!(scope = if flush_all { "all" } else { "current" }, "cache cleared by admin");
    Ok(Json(json!({ "status": "success", "message": "cache cleared" })))
}

async fn feed_config(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ServeError> {
    let Json(body) = body.map_err(|_| ServeError::BadRequest("JSON body expected".into()))?;
    let feeds = body
        .get("feeds")
        .and_then(Value::as_object)
        .ok_or_else(|| ServeError::BadRequest("expected {\"feeds\": {name: url}}".into()))?;

    let registry =
        registry_from_json_map(feeds).map_err(|e| ServeError::BadRequest(e.to_string()))?;
    if registry.is_empty() {
        return Err(ServeError::BadRequest("no valid feeds found".into()));
    }

    let names = registry.names();
    state.registry.replace(registry);
    tracing::info!(target: "ingest", count = names.len(), "feed registry replaced");
    Ok(Json(json!({
        "status": "success",
        "message": format!("{} feeds configured", names.len()),
        "feeds": names,
    })))
}
