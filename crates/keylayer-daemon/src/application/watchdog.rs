//! Inactivity watchdog decisions and the restart guard.
//!
//! Some receivers stop delivering reports after the host sleeps or after a
//! USB hiccup, without ever returning a read error.  The only symptom is
//! silence, so a capture session restarts itself after a stretch with no
//! input.  This module holds the pure part of that logic so it can be tested
//! with synthetic instants.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What the watchdog should do on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    /// Input is recent enough.
    Healthy,
    /// A restart is already running; this tick must not start another.
    RestartInProgress,
    /// The device has been silent for at least the threshold.
    Restart,
}

/// Decides when silence means a stuck device.
#[derive(Debug, Clone, Copy)]
pub struct InactivityWatchdog {
    threshold: Duration,
}

impl InactivityWatchdog {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn check(&self, last_input: Instant, now: Instant, restarting: bool) -> TickDecision {
        if restarting {
            return TickDecision::RestartInProgress;
        }
        if now.saturating_duration_since(last_input) >= self.threshold {
            TickDecision::Restart
        } else {
            TickDecision::Healthy
        }
    }
}

/// Ensures at most one restart runs at a time.
#[derive(Debug, Clone, Default)]
pub struct RestartGuard {
    flag: Arc<AtomicBool>,
}

impl RestartGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the guard.  Returns `None` if a restart already holds it.
    pub fn try_begin(&self) -> Option<RestartPermit> {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RestartPermit {
                flag: Arc::clone(&self.flag),
            })
    }

    pub fn in_progress(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Proof of holding the [`RestartGuard`].  Dropping it (including when the
/// restart task is aborted) releases the guard.
#[derive(Debug)]
pub struct RestartPermit {
    flag: Arc<AtomicBool>,
}

impl Drop for RestartPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
