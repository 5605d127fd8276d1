//! Run one aggregation cycle against the configured feeds and oracle, then
//! print the committed snapshot as JSON.

use moodlight_sentiment::config::AppConfig;
use moodlight_sentiment::scheduler::CycleOutcome;
use moodlight_sentiment::Services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let services = Services::from_config(AppConfig::from_env()).await?;
    let outcome = services.pipeline.run_cycle().await;
    services.store.close().await;

    match outcome {
        CycleOutcome::Committed { snapshot, .. } => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        CycleOutcome::Failed(e) => Err(e.into()),
    }
}
