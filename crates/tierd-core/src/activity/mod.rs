//! Per-user activity tracking and idle-phase classification.
//!
//! Heartbeats update a user's last-interaction timestamp; the phase is always
//! recomputed from the current idle time against the configured thresholds.

mod phase;
mod tracker;
mod user;

pub use phase::{Phase, PhaseThresholds};
pub use tracker::{ActivityStats, ActivityTracker, Heartbeat, SharedTracker, UserActivity};
pub use user::{InvalidUserId, UserId};
