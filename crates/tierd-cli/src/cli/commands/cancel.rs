//! `tierd cancel <id>` – cancel a pending job.

use anyhow::{bail, Result};
use tierd_core::queue::JobStore;

pub async fn run_cancel(store: &JobStore, id: i64) -> Result<()> {
    if store.cancel_job(id).await? {
        println!("Cancelled job {}.", id);
        return Ok(());
    }
    match store.get_job(id).await? {
        None => bail!("job {} not found", id),
        Some(job) => bail!("job {} is {}; only pending jobs can be cancelled", id, job.status),
    }
}
