//! `tierd enqueue <user>` – queue analysis for a user.

use anyhow::Result;
use tierd_core::activity::UserId;
use tierd_core::queue::{JobStore, Priority};

pub async fn run_enqueue(store: &JobStore, user: &str, priority: Priority) -> Result<()> {
    let user = UserId::parse(user)?;
    let enqueued = store.enqueue(&user, priority).await?;
    if enqueued.created {
        println!("Queued job {} for {} ({}).", enqueued.id, user, priority);
    } else {
        println!("Job {} already queued for {}.", enqueued.id, user);
    }
    Ok(())
}
