//! RAII guard that frees a user's slot and budget charge when dropped.

use std::sync::Arc;

use crate::activity::UserId;

use super::control::Slot;
use super::PoolInner;

pub(super) struct SlotGuard {
    pub(super) inner: Arc<PoolInner>,
    pub(super) user: UserId,
    pub(super) released: bool,
}

impl SlotGuard {
    /// Release now and hand back the slot for settlement.
    pub(super) fn finish(mut self) -> Option<Slot> {
        self.released = true;
        self.inner.release_slot(&self.user)
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.released {
            self.inner.release_slot(&self.user);
        }
    }
}
