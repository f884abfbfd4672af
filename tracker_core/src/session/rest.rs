//! Rest countdown between sets.

use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Countdown started after a set
///
/// Remaining time is shown in whole seconds rounded up, so the display
/// reads 0 only once the rest is actually over.
#[derive(Clone, Copy, Debug)]
pub struct RestTimer {
    total: Duration,
    started_at: Instant,
}

impl RestTimer {
    pub fn start(total: Duration) -> Self {
        Self {
            total,
            started_at: Instant::now(),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.started_at.elapsed())
    }

    pub fn remaining_seconds(&self) -> u64 {
        let remaining = self.remaining();
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    /// Fraction of the rest still to go, from 1.0 down to 0.0
    pub fn progress(&self) -> f64 {
        if self.total.is_zero() {
            return 0.0;
        }
        self.remaining().as_secs_f64() / self.total.as_secs_f64()
    }

    pub fn is_done(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Call `on_tick` once a second with the seconds left, ending with 0
    pub async fn run(self, mut on_tick: impl FnMut(u64)) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let left = self.remaining_seconds();
            on_tick(left);
            if left == 0 {
                break;
            }
        }
        tracing::debug!("Rest of {}s finished", self.total.as_secs());
    }
}
