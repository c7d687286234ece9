//! Running-job registry: one slot and cancellation token per user.
//!
//! The pool registers a slot when it spawns a job and removes it when the job
//! settles. Reactivation, timeouts and shutdown cancel a job through its
//! slot's token; the unit of work observes the token and stops.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::activity::{Phase, UserId};
use crate::queue::JobId;

use super::types::{CancelReason, RunningJob};

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) job_id: JobId,
    /// Phase currently charged against the budget.
    pub(crate) phase: Phase,
    pub(crate) token: CancellationToken,
    pub(crate) started_at: Instant,
    /// First cancellation reason recorded for this run.
    pub(crate) reason: Option<CancelReason>,
}

#[derive(Debug, Default)]
pub(crate) struct SlotRegistry {
    slots: RwLock<HashMap<UserId, Slot>>,
}

impl SlotRegistry {
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, HashMap<UserId, Slot>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, HashMap<UserId, Slot>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a running job; returns its token, or `None` if the user
    /// already has one.
    pub(crate) fn register(
        &self,
        user: &UserId,
        job_id: JobId,
        phase: Phase,
    ) -> Option<CancellationToken> {
        let mut slots = self.write();
        if slots.contains_key(user) {
            return None;
        }
        let token = CancellationToken::new();
        slots.insert(
            user.clone(),
            Slot {
                job_id,
                phase,
                token: token.clone(),
                started_at: Instant::now(),
                reason: None,
            },
        );
        Some(token)
    }

    pub(crate) fn unregister(&self, user: &UserId) -> Option<Slot> {
        self.write().remove(user)
    }

    /// Cancel the user's running job. The first reason wins. Returns false if
    /// nothing is running for the user.
    pub(crate) fn request_cancel(&self, user: &UserId, reason: CancelReason) -> bool {
        let mut slots = self.write();
        let Some(slot) = slots.get_mut(user) else {
            return false;
        };
        slot.reason.get_or_insert(reason);
        slot.token.cancel();
        true
    }

    /// Cancel every running job; returns how many were signalled.
    pub(crate) fn cancel_all(&self, reason: CancelReason) -> usize {
        let mut slots = self.write();
        for slot in slots.values_mut() {
            slot.reason.get_or_insert(reason);
            slot.token.cancel();
        }
        slots.len()
    }

    pub(crate) fn contains(&self, user: &UserId) -> bool {
        self.read().contains_key(user)
    }

    pub(crate) fn users(&self) -> Vec<UserId> {
        let mut users: Vec<_> = self.read().keys().cloned().collect();
        users.sort();
        users
    }

    pub(crate) fn snapshot(&self) -> Vec<RunningJob> {
        let mut jobs: Vec<_> = self
            .read()
            .iter()
            .map(|(user, slot)| RunningJob {
                job_id: slot.job_id,
                user_id: user.clone(),
                phase: slot.phase,
                elapsed_ms: u64::try_from(slot.started_at.elapsed().as_millis())
                    .unwrap_or(u64::MAX),
            })
            .collect();
        jobs.sort_by_key(|j| j.job_id);
        jobs
    }
}
