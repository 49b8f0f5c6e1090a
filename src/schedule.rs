use std::time::{Duration, Instant};

/// Fixed-rate pacing measured from the start of each cycle.
///
/// An overrunning cycle is followed immediately by the next one; the lost
/// time is not made up later.
#[derive(Debug)]
pub struct Pacer {
    period: Duration,
    started: Instant,
}

impl Pacer {
    pub fn start(period: Duration) -> Self {
        Self {
            period,
            started: Instant::now(),
        }
    }

    /// Time left in the current cycle
    pub fn remaining(&self) -> Duration {
        remaining(self.period, self.started.elapsed())
    }
}

pub fn remaining(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}
