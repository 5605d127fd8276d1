// src/scheduler.rs
//! Periodic background recomputation.
//!
//! One cycle: collect → score → transform/classify → persist → invalidate.
//! Cycles never overlap, and a stop request is only honoured between cycles.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SubsecRound, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::CacheCoordinator;
use crate::error::PersistenceError;
use crate::history::{MoodSnapshot, SnapshotLog};
use crate::ingest::{self, config::RegistryHandle, types::SourceFetcher};
use crate::mood;
use crate::scoring::ScoreRequestBatcher;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scheduler_cycles_total", "Scheduler cycles by outcome.");
        describe_histogram!("scheduler_cycle_ms", "Wall time of one scheduler cycle.");
        describe_gauge!("mood_score_current", "Mood score of the last committed snapshot.");
    });
}

/// Everything one cycle needs, built once at startup.
pub struct Pipeline {
    pub fetcher: Arc<dyn SourceFetcher>,
    pub registry: RegistryHandle,
    pub batcher: ScoreRequestBatcher,
    pub log: Arc<dyn SnapshotLog>,
    pub cache: Arc<CacheCoordinator>,
    pub headlines_per_source: usize,
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// The snapshot was written. An empty batch commits a zero-count snapshot.
    Committed { id: i64, snapshot: MoodSnapshot },
    /// The snapshot could not be written; the cache was left alone.
    Failed(PersistenceError),
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Committed { .. } => "committed",
            CycleOutcome::Failed(_) => "failed",
        }
    }
}

impl Pipeline {
    pub async fn run_cycle(&self) -> CycleOutcome {
        ensure_metrics_described();
        let t0 = Instant::now();
        tracing::info!(target: "scheduler", "cycle started");

        let outcome = self.run_cycle_inner(t0).await;

        let elapsed_ms = t0.elapsed().as_millis() as u64;
        histogram!("scheduler_cycle_ms").record(elapsed_ms as f64);
        counter!("scheduler_cycles_total", "outcome" => outcome.label()).increment(1);
        match &outcome {
            CycleOutcome::Committed { id, snapshot } => tracing::info!(
                target: "scheduler",
                id,
                score = snapshot.score,
                category = %snapshot.category,
                analyzed = snapshot.analyzed_count,
                elapsed_ms,
                "cycle committed"
            ),
            CycleOutcome::Failed(e) => {
                tracing::error!(target: "scheduler", error = %e, elapsed_ms, "cycle failed to persist")
            }
        }
        outcome
    }

    async fn run_cycle_inner(&self, t0: Instant) -> CycleOutcome {
        let registry = self.registry.snapshot();
        let (batch, _stats) =
            ingest::collect(self.fetcher.as_ref(), &registry, self.headlines_per_source).await;
        if batch.is_empty() {
            tracing::warn!(
                target: "scheduler",
                sources = registry.len(),
                "no headlines collected; committing empty snapshot"
            );
        }

        let texts: Vec<String> = batch.iter().map(|i| i.text.clone()).collect();
        let scored = self.batcher.score_batch(&texts).await;
        let analysis = mood::analyze(&batch, &scored.scores);

        let snapshot = MoodSnapshot {
            id: None,
            // The log keeps millisecond precision.
            timestamp: Utc::now().trunc_subsecs(3),
            score: analysis.mood,
            category: analysis.category,
            analyzed_count: analysis.analyzed_count,
            source_count: registry.len(),
            distribution: analysis.distribution,
            response_time_ms: t0.elapsed().as_millis() as u64,
        };

        let id = match self.log.append(&snapshot).await {
            Ok(id) => id,
            Err(e) => return CycleOutcome::Failed(e),
        };
        gauge!("mood_score_current").set(snapshot.score);

        if let Err(e) = self.cache.invalidate().await {
            tracing::warn!(target: "scheduler", error = %e, "cache invalidation failed; entry expires by TTL");
        }

        CycleOutcome::Committed {
            id,
            snapshot: MoodSnapshot {
                id: Some(id),
                ..snapshot
            },
        }
    }
}

pub struct UpdateScheduler {
    pipeline: Arc<Pipeline>,
    interval: Duration,
    initial_delay: Duration,
}

impl UpdateScheduler {
    pub fn new(pipeline: Arc<Pipeline>, interval: Duration, initial_delay: Duration) -> Self {
        Self {
            pipeline,
            interval,
            initial_delay,
        }
    }

    /// Spawn the loop. Consumes the scheduler, so a process has one loop per instance.
    pub fn start(self) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let alive = Arc::new(AtomicBool::new(true));
        let cycles = Arc::new(AtomicU64::new(0));

        let guard = AliveGuard(alive.clone());
        let cycles_task = cycles.clone();
        let Self {
            pipeline,
            interval,
            initial_delay,
        } = self;

        let join = tokio::spawn(async move {
            let _guard = guard;
            tracing::info!(
                target: "scheduler",
                interval_secs = interval.as_secs(),
                initial_delay_secs = initial_delay.as_secs(),
                "scheduler started"
            );

            tokio::select! {
                _ = tokio::time::sleep(initial_delay) => {}
                _ = stop_rx.changed() => {
                    tracing::info!(target: "scheduler", "scheduler stopped before first cycle");
                    return;
                }
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => break,
                }
                pipeline.run_cycle().await;
                cycles_task.fetch_add(1, Ordering::SeqCst);
                if *stop_rx.borrow() {
                    break;
                }
            }
            tracing::info!(target: "scheduler", "scheduler stopped");
        });

        SchedulerHandle {
            stop_tx,
            join: Mutex::new(Some(join)),
            alive,
            cycles,
        }
    }
}

struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Control and liveness for a started scheduler. Dropping it stops the loop
/// after the current cycle.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    join: Mutex<Option<JoinHandle<()>>>,
    alive: Arc<AtomicBool>,
    cycles: Arc<AtomicU64>,
}

impl SchedulerHandle {
    /// False once the loop has exited, for any reason.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Request a stop and wait for the running cycle (if any) to finish.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        let join = self.join.lock().await.take();
        if let Some(join) = join {
            if let Err(e) = join.await {
                tracing::error!(target: "scheduler", error = %e, "scheduler task ended abnormally");
            }
        }
    }
}
