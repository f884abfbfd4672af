//! Pausable elapsed-time clock for the active session.

use std::time::Duration;
use tokio::time::Instant;

/// Pausable elapsed-time counter
///
/// Elapsed time is `base + (now - resumed_at)` while running and `base`
/// while paused. Uses tokio's clock so paused-time tests can drive it.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stopwatch {
    base: Duration,
    resumed_at: Option<Instant>,
}

impl Stopwatch {
    /// A paused stopwatch already showing `base`
    pub fn with_base(base: Duration) -> Self {
        Self {
            base,
            resumed_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.resumed_at.is_some()
    }

    pub fn resume(&mut self) {
        if self.resumed_at.is_none() {
            self.resumed_at = Some(Instant::now());
        }
    }

    /// Fold the running delta into the base
    pub fn pause(&mut self) {
        if let Some(resumed_at) = self.resumed_at.take() {
            self.base += resumed_at.elapsed();
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self.resumed_at {
            Some(resumed_at) => self.base + resumed_at.elapsed(),
            None => self.base,
        }
    }
}
