//! Per-phase worker budget shared by every running job.
//!
//! Each idle phase has its own ceiling, and a global ceiling caps the sum.
//! A job reserves one slot of its phase before it is spawned and releases it
//! when it settles.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::activity::Phase;
use crate::config::BudgetsConfig;

/// Slot counters for Active (always zero) and the three idle phases.
const SLOTS: usize = 4;

#[derive(Debug)]
pub struct PhaseBudget {
    ceilings: [usize; SLOTS],
    cpu_shares: [u8; SLOTS],
    in_use: [AtomicUsize; SLOTS],
    max_total: usize,
    total_in_use: AtomicUsize,
}

impl PhaseBudget {
    /// Build from the configured per-phase budgets and a global ceiling.
    pub fn new(budgets: &BudgetsConfig, max_total: usize) -> Self {
        let mut ceilings = [0usize; SLOTS];
        let mut cpu_shares = [0u8; SLOTS];
        for phase in Phase::IDLE_PHASES {
            if let Some(b) = budgets.for_phase(phase) {
                ceilings[phase.index()] = b.max_concurrent;
                cpu_shares[phase.index()] = b.cpu_share;
            }
        }
        Self {
            ceilings,
            cpu_shares,
            in_use: Default::default(),
            max_total: max_total.max(1),
            total_in_use: AtomicUsize::new(0),
        }
    }

    pub fn ceiling(&self, phase: Phase) -> usize {
        self.ceilings[phase.index()]
    }

    pub fn cpu_share(&self, phase: Phase) -> u8 {
        self.cpu_shares[phase.index()]
    }

    pub fn in_use(&self, phase: Phase) -> usize {
        self.in_use[phase.index()].load(Ordering::Relaxed)
    }

    pub fn total_in_use(&self) -> usize {
        self.total_in_use.load(Ordering::Relaxed)
    }

    pub fn max_total(&self) -> usize {
        self.max_total
    }

    /// True iff both the phase and the global counters are below their ceilings.
    pub fn can_accept(&self, phase: Phase) -> bool {
        phase.is_idle()
            && self.in_use(phase) < self.ceiling(phase)
            && self.total_in_use() < self.max_total
    }

    /// Reserve one slot of `phase`. Returns false (and reserves nothing) when
    /// either ceiling is reached. Pair with [`release`](Self::release).
    pub fn try_reserve(&self, phase: Phase) -> bool {
        if !phase.is_idle() {
            return false;
        }
        let i = phase.index();
        if !try_increment(&self.in_use[i], self.ceilings[i]) {
            return false;
        }
        if !try_increment(&self.total_in_use, self.max_total) {
            decrement(&self.in_use[i]);
            return false;
        }
        true
    }

    /// Release one slot of `phase`.
    pub fn release(&self, phase: Phase) {
        decrement(&self.in_use[phase.index()]);
        decrement(&self.total_in_use);
    }

    /// Move one reserved slot from `from` to `to`. The global count is unchanged.
    /// Returns false if `to` is full.
    pub fn try_transfer(&self, from: Phase, to: Phase) -> bool {
        if from == to {
            return true;
        }
        if !to.is_idle() || !try_increment(&self.in_use[to.index()], self.ceilings[to.index()]) {
            return false;
        }
        decrement(&self.in_use[from.index()]);
        true
    }

    /// Approximate CPU percentage in use: each phase contributes its share
    /// scaled by how many of its slots are busy.
    pub fn cpu_usage_estimate(&self) -> f64 {
        let total: f64 = Phase::IDLE_PHASES
            .iter()
            .filter(|p| self.ceiling(**p) > 0)
            .map(|p| {
                let ratio = self.in_use(*p) as f64 / self.ceiling(*p) as f64;
                ratio * f64::from(self.cpu_share(*p))
            })
            .sum();
        total.min(100.0)
    }
}

fn try_increment(counter: &AtomicUsize, max: usize) -> bool {
    let mut current = counter.load(Ordering::Relaxed);
    loop {
        if current >= max {
            return false;
        }
        match counter.compare_exchange_weak(
            current,
            current + 1,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return true,
            Err(actual) => current = actual,
        }
    }
}

fn decrement(counter: &AtomicUsize) {
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Relaxed, |n| n.checked_sub(1));
}
