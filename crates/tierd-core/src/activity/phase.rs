//! Activity phases and the idle-time thresholds that separate them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Activity tier derived from idle time. Ordered: `Active < Phase1 < Phase2 < Phase3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Active,
    Phase1,
    Phase2,
    Phase3,
}

impl Phase {
    /// Phases that may run background work, lightest first.
    pub const IDLE_PHASES: [Phase; 3] = [Phase::Phase1, Phase::Phase2, Phase::Phase3];

    /// Order in which a poll tick services phases: heaviest budget first.
    pub const DISPATCH_ORDER: [Phase; 3] = [Phase::Phase3, Phase::Phase2, Phase::Phase1];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Active => "active",
            Phase::Phase1 => "phase1",
            Phase::Phase2 => "phase2",
            Phase::Phase3 => "phase3",
        }
    }

    pub fn is_idle(self) -> bool {
        self != Phase::Active
    }

    /// Index into per-phase tables (0 = Active).
    pub(crate) fn index(self) -> usize {
        match self {
            Phase::Active => 0,
            Phase::Phase1 => 1,
            Phase::Phase2 => 2,
            Phase::Phase3 => 3,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Idle durations at which a user enters Phase1, Phase2 and Phase3.
///
/// Lower bounds are inclusive: an idle time equal to a threshold already
/// belongs to the deeper phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseThresholds {
    phase1: Duration,
    phase2: Duration,
    phase3: Duration,
}

impl Default for PhaseThresholds {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(10 * 60),
            Duration::from_secs(30 * 60),
            Duration::from_secs(60 * 60),
        )
    }
}

impl PhaseThresholds {
    /// Thresholds are sorted so a misordered table still yields a monotonic mapping.
    pub fn new(phase1: Duration, phase2: Duration, phase3: Duration) -> Self {
        let mut t = [phase1, phase2, phase3];
        t.sort();
        Self {
            phase1: t[0],
            phase2: t[1],
            phase3: t[2],
        }
    }

    /// Map an idle duration to a phase. `None` means "no record" and is
    /// treated as infinitely idle.
    pub fn phase_for(&self, idle: Option<Duration>) -> Phase {
        let Some(idle) = idle else {
            return Phase::Phase3;
        };
        if idle >= self.phase3 {
            Phase::Phase3
        } else if idle >= self.phase2 {
            Phase::Phase2
        } else if idle >= self.phase1 {
            Phase::Phase1
        } else {
            Phase::Active
        }
    }

    /// Threshold at which `phase` starts (zero for `Active`).
    pub fn lower_bound(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Active => Duration::ZERO,
            Phase::Phase1 => self.phase1,
            Phase::Phase2 => self.phase2,
            Phase::Phase3 => self.phase3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mins(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    #[test]
    fn default_table() {
        let t = PhaseThresholds::default();
        assert_eq!(t.phase_for(Some(Duration::ZERO)), Phase::Active);
        assert_eq!(t.phase_for(Some(mins(9))), Phase::Active);
        assert_eq!(t.phase_for(Some(mins(11))), Phase::Phase1);
        assert_eq!(t.phase_for(Some(mins(31))), Phase::Phase2);
        assert_eq!(t.phase_for(Some(mins(61))), Phase::Phase3);
    }

    #[test]
    fn lower_bound_is_inclusive() {
        let t = PhaseThresholds::default();
        assert_eq!(t.phase_for(Some(mins(10))), Phase::Phase1);
        assert_eq!(t.phase_for(Some(mins(30))), Phase::Phase2);
        assert_eq!(t.phase_for(Some(mins(60))), Phase::Phase3);
        assert_eq!(t.phase_for(Some(mins(10) - Duration::from_millis(1))), Phase::Active);
    }

    #[test]
    fn missing_record_is_deepest_phase() {
        assert_eq!(PhaseThresholds::default().phase_for(None), Phase::Phase3);
    }

    #[test]
    fn mapping_is_monotonic() {
        let t = PhaseThresholds::default();
        let mut prev = Phase::Active;
        for secs in (0..=2 * 60 * 60).step_by(7) {
            let p = t.phase_for(Some(Duration::from_secs(secs)));
            assert!(p >= prev, "phase went backwards at {secs}s");
            prev = p;
        }
        assert_eq!(prev, Phase::Phase3);
    }

    #[test]
    fn misordered_input_is_sorted() {
        let t = PhaseThresholds::new(mins(60), mins(10), mins(30));
        assert_eq!(t.lower_bound(Phase::Phase1), mins(10));
        assert_eq!(t.lower_bound(Phase::Phase3), mins(60));
    }

    #[test]
    fn phase_ordering_and_names() {
        assert!(Phase::Active < Phase::Phase1);
        assert!(Phase::Phase2 < Phase::Phase3);
        assert_eq!(Phase::Phase2.to_string(), "phase2");
        assert_eq!(serde_json::to_string(&Phase::Phase3).unwrap(), "\"phase3\"");
    }
}
