//! `tierd cleanup` – purge old finished jobs.

use anyhow::Result;
use tierd_core::queue::JobStore;

pub async fn run_cleanup(store: &JobStore, days: u32) -> Result<()> {
    let purged = store.cleanup(days).await?;
    println!("Removed {} finished job(s) older than {} day(s).", purged, days);
    Ok(())
}
