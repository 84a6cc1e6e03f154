//! Reset trigger shared between the control channel and the simulation loop.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::registry::SimulationController;

/// Two-flag latch: `triggered` is armed by clients, `resetting` is held by
/// the simulation while a reset runs.
///
/// A trigger is refused while a reset is in progress. Triggers arriving
/// before the simulation picks up a pending one collapse into it.
#[derive(Debug, Default)]
pub struct ResetLatch {
    triggered: AtomicBool,
    resetting: AtomicBool,
}

impl ResetLatch {
    /// Create an idle latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the pending trigger, clearing it. Called by the simulation loop.
    pub fn take_trigger(&self) -> bool {
        self.triggered.swap(false, Ordering::AcqRel)
    }

    /// Mark a reset as running.
    pub fn begin_reset(&self) {
        self.resetting.store(true, Ordering::Release);
    }

    /// Mark the running reset as complete.
    pub fn finish_reset(&self) {
        self.resetting.store(false, Ordering::Release);
    }

    /// Whether a reset is running.
    pub fn is_resetting(&self) -> bool {
        self.resetting.load(Ordering::Acquire)
    }

    /// Whether a trigger is waiting to be picked up.
    pub fn is_pending(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }
}

impl SimulationController for ResetLatch {
    fn trigger_reset(&self) -> bool {
        if self.is_resetting() {
            return false;
        }
        self.triggered.store(true, Ordering::Release);
        true
    }
}
