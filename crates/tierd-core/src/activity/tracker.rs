//! In-memory activity records keyed by user.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::phase::{Phase, PhaseThresholds};
use super::user::UserId;

/// Last-seen bookkeeping for one user.
#[derive(Debug, Clone)]
pub struct UserActivity {
    pub user_id: UserId,
    pub last_interaction: Instant,
    pub session_start: Instant,
    /// Deepest phase whose analysis finished (or was abandoned) during the
    /// current idle stretch. Cleared by every heartbeat.
    pub analyzed_phase: Option<Phase>,
}

impl UserActivity {
    pub fn idle_time_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_interaction)
    }
}

/// Phase population snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityStats {
    pub active: usize,
    pub phase1: usize,
    pub phase2: usize,
    pub phase3: usize,
}

impl ActivityStats {
    pub fn count(&self, phase: Phase) -> usize {
        match phase {
            Phase::Active => self.active,
            Phase::Phase1 => self.phase1,
            Phase::Phase2 => self.phase2,
            Phase::Phase3 => self.phase3,
        }
    }

    fn bump(&mut self, phase: Phase) {
        match phase {
            Phase::Active => self.active += 1,
            Phase::Phase1 => self.phase1 += 1,
            Phase::Phase2 => self.phase2 += 1,
            Phase::Phase3 => self.phase3 += 1,
        }
    }

    pub fn tracked(&self) -> usize {
        self.active + self.phase1 + self.phase2 + self.phase3
    }
}

/// Result of recording a heartbeat (read-after-write view).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub user_id: UserId,
    pub idle: Duration,
    pub phase: Phase,
    /// True when this heartbeat opened a new session.
    pub new_session: bool,
}

/// Tracks when each user last interacted and classifies them into phases.
///
/// Every query has an `_at` variant that takes the current instant so callers
/// (and tests) control the clock.
#[derive(Debug)]
pub struct ActivityTracker {
    users: HashMap<UserId, UserActivity>,
    thresholds: PhaseThresholds,
    stale_after: Duration,
}

impl ActivityTracker {
    /// `stale_after` is both the eviction horizon and the session gap.
    pub fn new(thresholds: PhaseThresholds, stale_after: Duration) -> Self {
        Self {
            users: HashMap::new(),
            thresholds,
            stale_after,
        }
    }

    pub fn thresholds(&self) -> &PhaseThresholds {
        &self.thresholds
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn get(&self, user: &UserId) -> Option<&UserActivity> {
        self.users.get(user)
    }

    pub fn record_activity(&mut self, user: &UserId) -> Heartbeat {
        self.record_activity_at(user, Instant::now())
    }

    /// Update (or create) the user's record with `now` as last interaction.
    pub fn record_activity_at(&mut self, user: &UserId, now: Instant) -> Heartbeat {
        let stale_after = self.stale_after;
        let mut new_session = false;
        self.users
            .entry(user.clone())
            .and_modify(|rec| {
                if now.saturating_duration_since(rec.last_interaction) > stale_after {
                    rec.session_start = now;
                    new_session = true;
                }
                rec.last_interaction = now;
                rec.analyzed_phase = None;
            })
            .or_insert_with(|| {
                new_session = true;
                UserActivity {
                    user_id: user.clone(),
                    last_interaction: now,
                    session_start: now,
                    analyzed_phase: None,
                }
            });
        if new_session {
            tracing::debug!(user = %user, "new activity session");
        }
        Heartbeat {
            user_id: user.clone(),
            idle: Duration::ZERO,
            phase: self.thresholds.phase_for(Some(Duration::ZERO)),
            new_session,
        }
    }

    pub fn idle_time(&self, user: &UserId) -> Option<Duration> {
        self.idle_time_at(user, Instant::now())
    }

    /// Idle time, or `None` ("infinitely idle") when the user is not tracked.
    pub fn idle_time_at(&self, user: &UserId, now: Instant) -> Option<Duration> {
        self.users.get(user).map(|rec| rec.idle_time_at(now))
    }

    pub fn phase(&self, user: &UserId) -> Phase {
        self.phase_at(user, Instant::now())
    }

    pub fn phase_at(&self, user: &UserId, now: Instant) -> Phase {
        self.thresholds.phase_for(self.idle_time_at(user, now))
    }

    pub fn users_in_phase(&self, phase: Phase) -> Vec<UserId> {
        self.users_in_phase_at(phase, Instant::now())
    }

    /// Tracked users currently in `phase`, sorted for deterministic dispatch.
    pub fn users_in_phase_at(&self, phase: Phase, now: Instant) -> Vec<UserId> {
        let mut out: Vec<UserId> = self
            .users
            .values()
            .filter(|rec| self.thresholds.phase_for(Some(rec.idle_time_at(now))) == phase)
            .map(|rec| rec.user_id.clone())
            .collect();
        out.sort();
        out
    }

    /// Tracked users currently in any phase other than `phase`.
    pub fn users_outside_phase_at(&self, phase: Phase, now: Instant) -> Vec<UserId> {
        self.users
            .values()
            .filter(|rec| self.thresholds.phase_for(Some(rec.idle_time_at(now))) != phase)
            .map(|rec| rec.user_id.clone())
            .collect()
    }

    /// Tracked users in `phase` that have not yet been analyzed at this depth
    /// during their current idle stretch.
    pub fn awaiting_analysis_at(&self, phase: Phase, now: Instant) -> Vec<UserId> {
        let mut out: Vec<UserId> = self
            .users
            .values()
            .filter(|rec| self.thresholds.phase_for(Some(rec.idle_time_at(now))) == phase)
            .filter(|rec| rec.analyzed_phase.map_or(true, |done| done < phase))
            .map(|rec| rec.user_id.clone())
            .collect();
        out.sort();
        out
    }

    /// Remember that work for `phase` is settled for this idle stretch.
    /// No-op for untracked users.
    pub fn mark_analyzed(&mut self, user: &UserId, phase: Phase) {
        if let Some(rec) = self.users.get_mut(user) {
            rec.analyzed_phase = Some(rec.analyzed_phase.map_or(phase, |p| p.max(phase)));
        }
    }

    pub fn stats(&self) -> ActivityStats {
        self.stats_at(Instant::now())
    }

    pub fn stats_at(&self, now: Instant) -> ActivityStats {
        let mut stats = ActivityStats::default();
        for rec in self.users.values() {
            stats.bump(self.thresholds.phase_for(Some(rec.idle_time_at(now))));
        }
        stats
    }

    pub fn sweep_stale(&mut self) -> usize {
        self.sweep_stale_at(Instant::now())
    }

    /// Evict records idle longer than the stale horizon. Returns how many were removed.
    pub fn sweep_stale_at(&mut self, now: Instant) -> usize {
        let before = self.users.len();
        let stale_after = self.stale_after;
        self.users.retain(|_, rec| rec.idle_time_at(now) <= stale_after);
        let evicted = before - self.users.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.users.len(), "swept stale activity records");
        }
        evicted
    }
}

/// Tracker shared between the scheduler loop and the ingress handlers.
///
/// The lock is only held for in-memory bookkeeping, never across an await.
#[derive(Debug, Clone)]
pub struct SharedTracker(Arc<Mutex<ActivityTracker>>);

impl SharedTracker {
    pub fn new(tracker: ActivityTracker) -> Self {
        Self(Arc::new(Mutex::new(tracker)))
    }

    pub fn lock(&self) -> MutexGuard<'_, ActivityTracker> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests;
