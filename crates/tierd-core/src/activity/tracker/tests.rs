//! Tests for ActivityTracker.

use std::time::{Duration, Instant};

use super::super::{Phase, PhaseThresholds, UserId};
use super::ActivityTracker;

fn mins(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

fn uid(s: &str) -> UserId {
    UserId::parse(s).unwrap()
}

fn tracker() -> ActivityTracker {
    ActivityTracker::new(PhaseThresholds::default(), mins(120))
}

#[test]
fn idle_user_walks_through_phases() {
    let mut t = tracker();
    let t0 = Instant::now();
    let u = uid("u1");
    let hb = t.record_activity_at(&u, t0);
    assert_eq!(hb.phase, Phase::Active);
    assert!(hb.new_session);

    assert_eq!(t.phase_at(&u, t0 + mins(11)), Phase::Phase1);
    assert_eq!(t.phase_at(&u, t0 + mins(31)), Phase::Phase2);
    assert_eq!(t.phase_at(&u, t0 + mins(61)), Phase::Phase3);
}

#[test]
fn heartbeat_resets_phase() {
    let mut t = tracker();
    let t0 = Instant::now();
    let u = uid("u1");
    t.record_activity_at(&u, t0);
    assert_eq!(t.phase_at(&u, t0 + mins(45)), Phase::Phase2);

    let hb = t.record_activity_at(&u, t0 + mins(45));
    assert!(!hb.new_session);
    assert_eq!(t.phase_at(&u, t0 + mins(46)), Phase::Active);
    assert_eq!(t.idle_time_at(&u, t0 + mins(46)), Some(mins(1)));
}

#[test]
fn untracked_user_is_infinitely_idle() {
    let t = tracker();
    let u = uid("ghost");
    assert_eq!(t.idle_time_at(&u, Instant::now()), None);
    assert_eq!(t.phase_at(&u, Instant::now()), Phase::Phase3);
    assert!(t.users_in_phase_at(Phase::Phase3, Instant::now()).is_empty());
}

#[test]
fn stats_and_users_by_phase() {
    let mut t = tracker();
    let t0 = Instant::now();
    t.record_activity_at(&uid("a"), t0);
    t.record_activity_at(&uid("b"), t0 + mins(50));
    t.record_activity_at(&uid("c"), t0 + mins(50));
    t.record_activity_at(&uid("d"), t0 + mins(65));

    let now = t0 + mins(66);
    let stats = t.stats_at(now);
    assert_eq!(stats.active, 1);
    assert_eq!(stats.phase1, 2);
    assert_eq!(stats.phase2, 0);
    assert_eq!(stats.phase3, 1);
    assert_eq!(stats.tracked(), 4);

    assert_eq!(t.users_in_phase_at(Phase::Phase1, now), vec![uid("b"), uid("c")]);
    assert_eq!(t.users_in_phase_at(Phase::Phase3, now), vec![uid("a")]);
}

#[test]
fn sweep_evicts_only_stale_records() {
    let mut t = tracker();
    let t0 = Instant::now();
    t.record_activity_at(&uid("old"), t0);
    t.record_activity_at(&uid("fresh"), t0 + mins(100));

    assert_eq!(t.sweep_stale_at(t0 + mins(119)), 0);
    assert_eq!(t.sweep_stale_at(t0 + mins(121)), 1);
    assert!(t.get(&uid("old")).is_none());
    assert!(t.get(&uid("fresh")).is_some());

    // A user returning after eviction starts a new session.
    let hb = t.record_activity_at(&uid("old"), t0 + mins(130));
    assert!(hb.new_session);
}

#[test]
fn long_gap_starts_new_session() {
    let mut t = tracker();
    let t0 = Instant::now();
    let u = uid("u1");
    t.record_activity_at(&u, t0);
    t.record_activity_at(&u, t0 + mins(60));
    assert_eq!(t.get(&u).unwrap().session_start, t0);

    let hb = t.record_activity_at(&u, t0 + mins(60) + mins(121));
    assert!(hb.new_session);
    assert_eq!(t.get(&u).unwrap().session_start, t0 + mins(181));
}

#[test]
fn analyzed_phase_gates_until_next_heartbeat() {
    let mut t = tracker();
    let t0 = Instant::now();
    let u = uid("u1");
    t.record_activity_at(&u, t0);

    let now = t0 + mins(15);
    assert_eq!(t.awaiting_analysis_at(Phase::Phase1, now), vec![u.clone()]);
    t.mark_analyzed(&u, Phase::Phase1);
    assert!(t.awaiting_analysis_at(Phase::Phase1, now).is_empty());

    // Deeper phase is still owed.
    assert_eq!(t.awaiting_analysis_at(Phase::Phase2, t0 + mins(35)), vec![u.clone()]);

    // Marking a shallower phase never lowers the watermark.
    t.mark_analyzed(&u, Phase::Phase3);
    t.mark_analyzed(&u, Phase::Phase1);
    assert_eq!(t.get(&u).unwrap().analyzed_phase, Some(Phase::Phase3));

    t.record_activity_at(&u, t0 + mins(70));
    assert_eq!(t.get(&u).unwrap().analyzed_phase, None);
}

#[test]
fn mark_analyzed_ignores_untracked() {
    let mut t = tracker();
    t.mark_analyzed(&uid("nobody"), Phase::Phase2);
    assert!(t.is_empty());
}

#[test]
fn users_outside_phase_excludes_only_that_phase() {
    let mut t = tracker();
    let t0 = Instant::now();
    t.record_activity_at(&uid("deep"), t0);
    t.record_activity_at(&uid("mid"), t0 + mins(30));
    t.record_activity_at(&uid("busy"), t0 + mins(65));
    let now = t0 + mins(66);

    let mut outside = t.users_outside_phase_at(Phase::Phase3, now);
    outside.sort();
    assert_eq!(outside, vec![uid("busy"), uid("mid")]);

    let mut outside = t.users_outside_phase_at(Phase::Active, now);
    outside.sort();
    assert_eq!(outside, vec![uid("deep"), uid("mid")]);
}
