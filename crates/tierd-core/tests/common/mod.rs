//! Shared fixtures for scheduler integration tests.
#![allow(dead_code)]

pub mod scripted;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tierd_core::activity::{ActivityTracker, SharedTracker, UserId};
use tierd_core::config::TierdConfig;
use tierd_core::pool::{Settled, WorkerPool};
use tierd_core::queue::JobStore;
use tierd_core::scheduler::{AdaptiveScheduler, SchedulerHandle, SchedulerSettings};

use scripted::Scripted;

/// Scheduler wired to an on-disk store in a temp dir.
pub struct Rig {
    pub scheduler: AdaptiveScheduler<Scripted>,
    pub handle: SchedulerHandle,
    pub pool: WorkerPool,
    pub store: JobStore,
    pub executor: Arc<Scripted>,
    pub t0: Instant,
    _dir: TempDir,
}

pub async fn rig(cfg: TierdConfig) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::open_at(dir.path().join("jobs.db"))
        .await
        .unwrap()
        .with_max_attempts(cfg.max_attempts);
    let tracker = SharedTracker::new(ActivityTracker::new(
        cfg.thresholds.to_thresholds(),
        cfg.stale_after(),
    ));
    let (pool, settled_rx) = WorkerPool::from_config(&cfg);
    let executor = Arc::new(Scripted::default());
    let scheduler = AdaptiveScheduler::new(
        tracker,
        pool.clone(),
        settled_rx,
        store.clone(),
        Arc::clone(&executor),
        SchedulerSettings::from(&cfg),
    );
    let handle = scheduler.handle();
    Rig {
        scheduler,
        handle,
        pool,
        store,
        executor,
        t0: Instant::now(),
        _dir: dir,
    }
}

impl Rig {
    /// Wait for the next settlement and record it.
    pub async fn settle(&mut self) -> Settled {
        tokio::time::timeout(Duration::from_secs(5), self.scheduler.settle_next())
            .await
            .expect("settlement within 5s")
            .unwrap()
            .expect("pool alive")
    }

    pub fn at(&self, minutes: u64) -> Instant {
        self.t0 + Duration::from_secs(minutes * 60)
    }
}

pub fn uid(s: &str) -> UserId {
    UserId::parse(s).unwrap()
}
