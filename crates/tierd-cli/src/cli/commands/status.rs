//! `tierd status` – show job counts and all jobs.

use anyhow::Result;
use tierd_core::queue::JobStore;

pub async fn run_status(store: &JobStore) -> Result<()> {
    let counts = store.count_by_status().await?;
    println!(
        "pending {}  processing {}  completed {}  failed {}  cancelled {}",
        counts.pending, counts.processing, counts.completed, counts.failed, counts.cancelled
    );

    let jobs = store.list_jobs().await?;
    if jobs.is_empty() {
        println!("No jobs in database.");
        return Ok(());
    }
    println!(
        "{:<6} {:<11} {:<8} {:<9} {}",
        "ID", "STATUS", "PRIO", "ATTEMPTS", "USER"
    );
    for j in jobs {
        println!(
            "{:<6} {:<11} {:<8} {:<9} {}",
            j.id,
            j.status,
            j.priority,
            format!("{}/{}", j.attempt_count, j.max_attempts),
            j.user_id
        );
        if let Some(err) = j.error_message {
            println!("       last error: {}", err);
        }
    }
    Ok(())
}
