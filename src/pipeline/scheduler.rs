//! Periodic and on-demand pass triggering.
//!
//! At most one pass runs at a time. A trigger that arrives while a pass is in
//! progress is a no-op, so a slow pass never queues up a burst behind it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::pipeline::engine::{Engine, PassReport};

#[derive(Clone)]
pub struct Scheduler {
    engine: Arc<Engine>,
    running: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            running: Arc::new(Mutex::new(())),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run one pass, or return `None` if one is already running.
    pub async fn trigger(&self) -> Result<Option<PassReport>> {
        let Ok(_guard) = self.running.try_lock() else {
            log::warn!("Pass already in progress, skipping trigger");
            return Ok(None);
        };
        self.engine.run_pass().await.map(Some)
    }

    /// Trigger a pass every `interval` until `shutdown` resolves.
    ///
    /// Passes run as their own tasks so that ticks keep arriving during a
    /// slow pass and are dropped by the guard.
    pub async fn run_every(
        &self,
        interval: Duration,
        run_on_start: bool,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        if !run_on_start {
            ticker.tick().await;
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Shutdown requested, stopping scheduler");
                    break;
                }
                _ = ticker.tick() => {
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = scheduler.trigger().await {
                            log::error!("Pass failed: {}", e);
                        }
                    });
                }
            }
        }

        // Let a pass in flight finish before returning
        let _idle = self.running.lock().await;
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::Notify;

    use super::*;
    use crate::models::Config;
    use crate::pipeline::engine::EngineParts;
    use crate::pipeline::test_support::{Recorder, StaticCatalog, item};
    use crate::services::MemorySubscriptionIndex;
    use crate::storage::{MemoryDedupCache, MemorySnapshotStore, MemoryStatusCache};

    fn engine(catalog: Arc<StaticCatalog>) -> Arc<Engine> {
        Arc::new(Engine::new(
            &Config::default(),
            EngineParts {
                catalog,
                status: Arc::new(MemoryStatusCache::new()),
                dedup: Arc::new(MemoryDedupCache::new()),
                snapshots: Arc::new(MemorySnapshotStore::new()),
                index: Arc::new(MemorySubscriptionIndex::default()),
                channels: Arc::new(Recorder::default()).channel_set(),
            },
        ))
    }

    #[tokio::test]
    async fn test_trigger_runs_a_pass() {
        let scheduler = Scheduler::new(engine(Arc::new(StaticCatalog::new(vec![item("A", true)]))));
        let report = scheduler.trigger().await.unwrap().unwrap();
        assert_eq!(report.bootstrapped, 1);
    }

    #[tokio::test]
    async fn test_concurrent_trigger_is_noop() {
        let gate = Arc::new(Notify::new());
        let catalog = Arc::new(StaticCatalog::gated(vec![item("A", true)], gate.clone()));
        let scheduler = Scheduler::new(engine(catalog));

        let first = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.trigger().await })
        };
        // Wait until the first pass holds the guard
        while scheduler.running.try_lock().is_ok() {
            tokio::task::yield_now().await;
        }

        assert!(scheduler.trigger().await.unwrap().is_none());

        gate.notify_one();
        let report = first.await.unwrap().unwrap();
        assert!(report.is_some());
    }

    #[tokio::test]
    async fn test_run_every_stops_on_shutdown() {
        let scheduler = Scheduler::new(engine(Arc::new(StaticCatalog::new(vec![item("A", true)]))));
        let status = scheduler.clone();

        scheduler
            .run_every(
                Duration::from_millis(10),
                true,
                tokio::time::sleep(Duration::from_millis(35)),
            )
            .await;

        assert_eq!(status.engine().status().len().await.unwrap(), 1);
    }
}
