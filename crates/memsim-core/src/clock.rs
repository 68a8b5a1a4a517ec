//! Virtual clock for discrete-event simulation.
//!
//! The [`SimClock`] tracks simulation time independently of wall-clock time,
//! advancing only when events are processed. This keeps runs deterministic
//! and repeatable regardless of host machine speed.

use serde::{Deserialize, Serialize};

/// Virtual simulation clock.
///
/// Time is a real number in workload units. Because STARTED events are pulled
/// ahead of their request time by the lead window, the first event may sit at
/// a negative timestamp, so the clock accepts any finite first value and only
/// enforces monotonicity from then on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimClock {
    /// Current simulation time.
    now: f64,
    /// Number of times the clock has been advanced.
    ticks: u64,
}

impl SimClock {
    /// Create a new clock at time zero.
    pub fn new() -> Self {
        Self { now: 0.0, ticks: 0 }
    }

    /// Current simulation time.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Number of advances performed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance the clock to a specific time.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if `time` is earlier than the last time the clock
    /// was advanced to.
    pub fn advance_to(&mut self, time: f64) {
        debug_assert!(
            self.ticks == 0 || time >= self.now,
            "Cannot move clock backwards: current={}, target={}",
            self.now,
            time,
        );
        self.now = time;
        self.ticks += 1;
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}
