//! Time utilities for search timers

use std::time::{Duration, Instant};

/// Fraction of `limit` that has elapsed between `start` and `now`.
/// Not clamped: values above 1.0 mean the limit has passed.
pub fn elapsed_fraction(start: Instant, now: Instant, limit: Duration) -> f32 {
    let limit = limit.as_secs_f32();
    if limit <= 0.0 {
        return f32::INFINITY;
    }
    now.saturating_duration_since(start).as_secs_f32() / limit
}

/// A point in time after which some outstanding request is abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    /// `None` when the timeout reaches past what `Instant` can represent
    at: Option<Instant>,
}

impl Deadline {
    pub fn after(now: Instant, timeout: Duration) -> Self {
        Self {
            at: now.checked_add(timeout),
        }
    }

    pub fn has_passed(&self, now: Instant) -> bool {
        self.at.is_some_and(|at| now > at)
    }
}
