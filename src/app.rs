// src/app.rs
//! Service wiring: every long-lived handle is built here exactly once and then
//! passed to the scheduler and the router.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use shuttle_axum::axum::{self, Router};
use tokio::net::TcpListener;

use crate::api::{self, AppState};
use crate::cache::{build_backend, CacheBackend, CacheCoordinator};
use crate::config::{AppConfig, OracleConfig};
use crate::history::HistoryStore;
use crate::ingest::config::{load_registry_default, FeedRegistry, RegistryHandle};
use crate::ingest::providers::rss::RssFetcher;
use crate::ingest::types::SourceFetcher;
use crate::metrics::Metrics;
use crate::scheduler::{Pipeline, SchedulerHandle, UpdateScheduler};
use crate::scoring::{
    oracle::{build_oracle, DynOracle},
    ScoreRequestBatcher,
};

pub struct Services {
    pub config: AppConfig,
    pub store: Arc<HistoryStore>,
    pub cache: Arc<CacheCoordinator>,
    pub registry: RegistryHandle,
    pub pipeline: Arc<Pipeline>,
}

/// Collaborators that tests swap out.
pub struct Collaborators {
    pub fetcher: Arc<dyn SourceFetcher>,
    pub oracle: DynOracle,
    pub oracle_timeout: std::time::Duration,
    pub cache_backend: Arc<dyn CacheBackend>,
    pub registry: FeedRegistry,
}

impl Services {
    /// Production wiring from `AppConfig` and the config files it points to.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let oracle_cfg = OracleConfig::load_or_env(&config.oracle_config_path)
            .with_context(|| format!("loading oracle config from {}", config.oracle_config_path))?;
        let registry = load_registry_default().context("loading feed registry")?;
        let fetcher = RssFetcher::http(config.fetch_timeout).context("building feed http client")?;

        let store = HistoryStore::connect(&config.database_url)
            .await
            .with_context(|| format!("opening database {}", config.database_url))?;

        let collab = Collaborators {
            fetcher: Arc::new(fetcher),
            oracle: build_oracle(&oracle_cfg),
            oracle_timeout: std::time::Duration::from_secs(oracle_cfg.timeout_secs),
            cache_backend: build_backend(config.redis_url.as_deref()),
            registry,
        };
        Ok(Self::assemble(config, Arc::new(store), collab))
    }

    pub fn assemble(config: AppConfig, store: Arc<HistoryStore>, collab: Collaborators) -> Self {
        let cache = Arc::new(CacheCoordinator::new(
            collab.cache_backend,
            store.clone(),
            config.cache_ttl,
            config.update_interval,
        ));
        let registry = RegistryHandle::new(collab.registry);
        let pipeline = Arc::new(Pipeline {
            fetcher: collab.fetcher,
            registry: registry.clone(),
            batcher: ScoreRequestBatcher::new(collab.oracle, collab.oracle_timeout),
            log: store.clone(),
            cache: cache.clone(),
            headlines_per_source: config.headlines_per_source,
        });

        tracing::info!(
            sources = registry.snapshot().len(),
            oracle = pipeline.batcher.oracle_name(),
            cache = cache.backend_name(),
            "services ready"
        );

        Self {
            config,
            store,
            cache,
            registry,
            pipeline,
        }
    }

    pub fn start_scheduler(&self) -> SchedulerHandle {
        UpdateScheduler::new(
            self.pipeline.clone(),
            self.config.update_interval,
            self.config.initial_delay,
        )
        .start()
    }

    pub fn app_state(&self, scheduler: Option<Arc<SchedulerHandle>>) -> AppState {
        AppState {
            cache: self.cache.clone(),
            store: self.store.clone(),
            registry: self.registry.clone(),
            scheduler,
        }
    }

    /// Full HTTP surface: API routes plus `/metrics` when a recorder is given.
    pub fn router(&self, scheduler: Option<Arc<SchedulerHandle>>, metrics: Option<&Metrics>) -> Router {
        let app = api::router(self.app_state(scheduler));
        match metrics {
            Some(m) => app.merge(m.router()),
            None => app,
        }
    }

    /// Start the scheduler and bundle everything the HTTP server needs,
    /// including what it must release on shutdown.
    pub fn into_service(self, metrics: Option<&Metrics>) -> MoodlightService {
        let scheduler = Arc::new(self.start_scheduler());
        MoodlightService {
            router: self.router(Some(scheduler.clone()), metrics),
            scheduler,
            store: self.store,
        }
    }
}

/// Serves the router; on shutdown drains HTTP, stops the scheduler, then
/// closes the database pool.
pub struct MoodlightService {
    router: Router,
    scheduler: Arc<SchedulerHandle>,
    store: Arc<HistoryStore>,
}

impl MoodlightService {
    pub fn scheduler(&self) -> Arc<SchedulerHandle> {
        self.scheduler.clone()
    }

    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .context("http server")?;

        tracing::info!("http server drained, stopping scheduler");
        self.scheduler.stop().await;
        self.store.close().await;
        tracing::info!("shutdown complete");
        Ok(())
    }
}

#[async_trait]
impl shuttle_runtime::Service for MoodlightService {
    async fn bind(self, addr: SocketAddr) -> Result<(), shuttle_runtime::Error> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        self.serve(listener, shutdown_signal()).await?;
        Ok(())
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
