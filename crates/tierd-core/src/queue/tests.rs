//! Tests for the job queue (use in-memory DB helper from db).

use crate::activity::{Phase, UserId};
use crate::queue::db::{open_memory, unix_timestamp};
use crate::queue::{JobStatus, Priority};

fn uid(s: &str) -> UserId {
    UserId::parse(s).unwrap()
}

#[tokio::test]
async fn enqueue_is_idempotent_per_user() {
    let store = open_memory().await.unwrap();
    let u = uid("alice");

    let first = store.enqueue(&u, Priority::Normal).await.unwrap();
    assert!(first.created);
    let second = store.enqueue(&u, Priority::Normal).await.unwrap();
    assert!(!second.created);
    assert_eq!(first.id, second.id);

    let jobs = store.list_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Pending);
    assert_eq!(jobs[0].attempt_count, 0);
    assert_eq!(jobs[0].max_attempts, 3);
}

#[tokio::test]
async fn enqueue_upgrades_priority_but_never_downgrades() {
    let store = open_memory().await.unwrap();
    let u = uid("bob");
    let id = store.enqueue(&u, Priority::Low).await.unwrap().id;

    store.enqueue(&u, Priority::High).await.unwrap();
    assert_eq!(store.get_job(id).await.unwrap().unwrap().priority, Priority::High);

    store.enqueue(&u, Priority::Low).await.unwrap();
    assert_eq!(store.get_job(id).await.unwrap().unwrap().priority, Priority::High);
    assert_eq!(store.list_jobs().await.unwrap().len(), 1);
}

#[tokio::test]
async fn enqueue_while_processing_reuses_job() {
    let store = open_memory().await.unwrap();
    let u = uid("carol");
    let id = store.enqueue(&u, Priority::Normal).await.unwrap().id;
    assert!(store.mark_processing(id).await.unwrap());

    let again = store.enqueue(&u, Priority::High).await.unwrap();
    assert_eq!(again.id, id);
    assert!(!again.created);

    // Once completed, a new request creates a fresh job.
    assert!(store.mark_completed(id).await.unwrap());
    let fresh = store.enqueue(&u, Priority::Normal).await.unwrap();
    assert!(fresh.created);
    assert_ne!(fresh.id, id);
}

#[tokio::test]
async fn next_eligible_orders_by_priority_then_age() {
    let store = open_memory().await.unwrap();
    let low = store.enqueue(&uid("u-low"), Priority::Low).await.unwrap().id;
    let n1 = store.enqueue(&uid("u-n1"), Priority::Normal).await.unwrap().id;
    let high = store.enqueue(&uid("u-high"), Priority::High).await.unwrap().id;
    let n2 = store.enqueue(&uid("u-n2"), Priority::Normal).await.unwrap().id;

    let ids: Vec<_> = store
        .next_eligible(Phase::Phase3, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(ids, vec![high, n1, n2, low]);

    // Phase1 may not draw low-priority work.
    let ids: Vec<_> = store
        .next_eligible(Phase::Phase1, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(ids, vec![high, n1, n2]);

    assert!(store.next_eligible(Phase::Active, 10).await.unwrap().is_empty());
    assert_eq!(store.next_eligible(Phase::Phase3, 2).await.unwrap().len(), 2);
    let page = store.eligible_page(Phase::Phase3, 2, 2).await.unwrap();
    assert_eq!(page.iter().map(|j| j.id).collect::<Vec<_>>(), vec![n2, low]);
}

#[tokio::test]
async fn halt_returns_to_pending_without_counting_attempt() {
    let store = open_memory().await.unwrap();
    let id = store.enqueue(&uid("dave"), Priority::Normal).await.unwrap().id;
    assert!(store.mark_processing(id).await.unwrap());
    let job = store.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert!(job.started_at.is_some());

    assert!(store.mark_pending_for_retry(id).await.unwrap());
    let job = store.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempt_count, 0);
    assert!(job.started_at.is_none());
}

#[tokio::test]
async fn failures_retry_until_max_attempts() {
    let store = open_memory().await.unwrap();
    let id = store.enqueue(&uid("erin"), Priority::Normal).await.unwrap().id;

    for attempt in 1..=3u32 {
        assert!(store.mark_processing(id).await.unwrap());
        let status = store.mark_failed(id, "boom").await.unwrap();
        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.attempt_count, attempt);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
        if attempt < 3 {
            assert_eq!(status, Some(JobStatus::Pending));
        } else {
            assert_eq!(status, Some(JobStatus::Failed));
            assert!(job.completed_at.is_some());
        }
    }

    // Terminal: never eligible, never re-dispatched.
    assert!(store.next_eligible(Phase::Phase3, 10).await.unwrap().is_empty());
    assert!(!store.mark_processing(id).await.unwrap());
}

#[tokio::test]
async fn transitions_from_wrong_state_are_noops() {
    let store = open_memory().await.unwrap();
    let id = store.enqueue(&uid("frank"), Priority::Normal).await.unwrap().id;
    assert!(!store.mark_completed(id).await.unwrap());
    assert!(!store.mark_pending_for_retry(id).await.unwrap());
    assert_eq!(store.mark_failed(id, "x").await.unwrap(), None);
    assert!(!store.mark_processing(9_999).await.unwrap());
}

#[tokio::test]
async fn max_attempts_comes_from_store_setting() {
    let store = open_memory().await.unwrap().with_max_attempts(1);
    let id = store.enqueue(&uid("gina"), Priority::Normal).await.unwrap().id;
    store.mark_processing(id).await.unwrap();
    assert_eq!(
        store.mark_failed(id, "once").await.unwrap(),
        Some(JobStatus::Failed)
    );
}

#[tokio::test]
async fn cancel_only_affects_pending_jobs() {
    let store = open_memory().await.unwrap();
    let pending = store.enqueue(&uid("h1"), Priority::Normal).await.unwrap().id;
    let running = store.enqueue(&uid("h2"), Priority::Normal).await.unwrap().id;
    store.mark_processing(running).await.unwrap();

    assert!(store.cancel_job(pending).await.unwrap());
    assert!(!store.cancel_job(running).await.unwrap());
    assert_eq!(
        store.get_job(pending).await.unwrap().unwrap().status,
        JobStatus::Cancelled
    );
    // A cancelled job frees the user for a new one.
    assert!(store.enqueue(&uid("h1"), Priority::Normal).await.unwrap().created);
}

#[tokio::test]
async fn recover_processing_jobs_resets_to_pending() {
    let store = open_memory().await.unwrap();
    let id = store.enqueue(&uid("ivan"), Priority::Normal).await.unwrap().id;
    store.mark_processing(id).await.unwrap();

    assert_eq!(store.recover_processing_jobs().await.unwrap(), 1);
    let job = store.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempt_count, 0);
}

#[tokio::test]
async fn cleanup_purges_only_old_terminal_jobs() {
    let store = open_memory().await.unwrap();
    let done = store.enqueue(&uid("j1"), Priority::Normal).await.unwrap().id;
    store.mark_processing(done).await.unwrap();
    store.mark_completed(done).await.unwrap();
    let live = store.enqueue(&uid("j2"), Priority::Normal).await.unwrap().id;

    // Nothing is older than a day yet.
    assert_eq!(store.cleanup(1).await.unwrap(), 0);

    let purged = store.purge_terminal_before(unix_timestamp() + 1).await.unwrap();
    assert_eq!(purged, 1);
    assert!(store.get_job(done).await.unwrap().is_none());
    assert!(store.get_job(live).await.unwrap().is_some());
}

#[tokio::test]
async fn count_and_active_lookup() {
    let store = open_memory().await.unwrap();
    let a = store.enqueue(&uid("k1"), Priority::Normal).await.unwrap().id;
    store.enqueue(&uid("k2"), Priority::Normal).await.unwrap();
    store.mark_processing(a).await.unwrap();

    let counts = store.count_by_status().await.unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.processing, 1);
    assert_eq!(counts.completed, 0);

    let active = store.active_job_for_user(&uid("k1")).await.unwrap().unwrap();
    assert_eq!(active.id, a);
    assert!(store.active_job_for_user(&uid("nobody")).await.unwrap().is_none());
}

#[tokio::test]
async fn eligible_page_skips_excluded_users() {
    let store = open_memory().await.unwrap();
    let a = store.enqueue(&uid("a"), Priority::High).await.unwrap().id;
    store.enqueue(&uid("b"), Priority::High).await.unwrap();
    let c = store.enqueue(&uid("c"), Priority::Normal).await.unwrap().id;

    let ids: Vec<_> = store
        .eligible_page_excluding(Phase::Phase3, &[uid("b"), uid("nobody")], 10, 0)
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(ids, vec![a, c]);

    let page = store
        .eligible_page_excluding(Phase::Phase3, &[uid("a")], 1, 1)
        .await
        .unwrap();
    assert_eq!(page.iter().map(|j| j.id).collect::<Vec<_>>(), vec![c]);
}
