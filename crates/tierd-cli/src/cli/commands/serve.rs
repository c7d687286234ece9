//! `tierd serve` – run the scheduler loop and the HTTP ingress.

use std::sync::Arc;

use anyhow::{Context, Result};
use tierd_core::activity::{ActivityTracker, SharedTracker};
use tierd_core::config::TierdConfig;
use tierd_core::ingress;
use tierd_core::pool::WorkerPool;
use tierd_core::queue::JobStore;
use tierd_core::scheduler::{AdaptiveScheduler, SchedulerSettings};
use tierd_core::work::SimulatedAnalysis;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub async fn run_serve(store: JobStore, cfg: &TierdConfig, bind: Option<String>) -> Result<()> {
    let tracker = SharedTracker::new(ActivityTracker::new(
        cfg.thresholds.to_thresholds(),
        cfg.stale_after(),
    ));
    let (pool, settled_rx) = WorkerPool::from_config(cfg);
    let scheduler = AdaptiveScheduler::new(
        tracker,
        pool,
        settled_rx,
        store,
        Arc::new(SimulatedAnalysis::default()),
        SchedulerSettings::from(cfg),
    );
    let router = ingress::build_router(scheduler.handle(), cfg.http.token.clone());

    let bind = bind.unwrap_or_else(|| cfg.http.bind.clone());
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {}", bind))?;
    println!("tierd listening on {}", listener.local_addr()?);

    let shutdown = CancellationToken::new();
    let http = tokio::spawn(ingress::serve(listener, router, shutdown.clone()));
    let mut sched = tokio::spawn(scheduler.run(shutdown.clone()));

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("listen for Ctrl-C")?;
            tracing::info!("shutdown requested");
        }
        res = &mut sched => {
            // The loop only returns early on a startup error.
            shutdown.cancel();
            http.await.context("http task")??;
            return res.context("scheduler task")?;
        }
    }

    shutdown.cancel();
    sched.await.context("scheduler task")??;
    http.await.context("http task")??;
    println!("tierd stopped");
    Ok(())
}
