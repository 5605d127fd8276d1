//! Moodlight sentiment service: binary entrypoint.
//! Boots shared services, starts the background scheduler and serves the
//! Axum router.

use moodlight_sentiment::app::MoodlightService;
use moodlight_sentiment::config::AppConfig;
use moodlight_sentiment::metrics::Metrics;
use moodlight_sentiment::Services;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Local tracing. Shuttle installs its own subscriber in deployments, so a
/// failed `try_init` is expected there and ignored.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("moodlight_sentiment=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> Result<MoodlightService, shuttle_runtime::Error> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env();
    tracing::info!(?config, "configuration loaded");

    let metrics = Metrics::init(config.update_interval, config.cache_ttl)
        .map_err(|e| anyhow::anyhow!("installing metrics recorder: {e}"))?;

    let services = Services::from_config(config).await?;
    Ok(services.into_service(Some(&metrics)))
}
