//! Shared run flag gating both engine loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Single-writer, multi-reader enabled flag.
///
/// The controller is the only writer. Loops poll it once per iteration, so a
/// stop is observed after at most one in-flight device call.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    running: Arc<AtomicBool>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self) {
        self.running.store(true, Ordering::Release);
    }

    /// Clear the flag, returning whether it was set.
    pub(crate) fn set_stopped(&self) -> bool {
        self.running.swap(false, Ordering::AcqRel)
    }
}
