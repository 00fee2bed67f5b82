//! Cooperative wall-clock budget for one run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Deadline fixed at construction as `start + ceiling - safety_margin`.
///
/// Polled at loop boundaries; it never interrupts work already started.
#[derive(Debug)]
pub struct ExecutionBudget {
    started: Instant,
    usable: Duration,
    exceeded: AtomicBool,
}

impl ExecutionBudget {
    pub fn new(ceiling: Duration, safety_margin: Duration) -> Self {
        Self {
            started: Instant::now(),
            usable: ceiling.saturating_sub(safety_margin),
            exceeded: AtomicBool::new(false),
        }
    }

    /// True while new work may start. The first `false` latches `exceeded`.
    pub fn has_time_remaining(&self) -> bool {
        if self.started.elapsed() < self.usable {
            true
        } else {
            self.exceeded.store(true, Ordering::Relaxed);
            false
        }
    }

    pub fn remaining(&self) -> Duration {
        self.usable.saturating_sub(self.started.elapsed())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether any check has observed the deadline.
    pub fn exceeded(&self) -> bool {
        self.exceeded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_is_exhausted() {
        let budget = ExecutionBudget::new(Duration::from_secs(60), Duration::from_secs(60));
        assert!(!budget.exceeded());
        assert!(!budget.has_time_remaining());
        assert!(budget.exceeded());
        assert_eq!(budget.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_generous_budget() {
        let budget = ExecutionBudget::new(Duration::from_secs(900), Duration::from_secs(60));
        assert!(budget.has_time_remaining());
        assert!(!budget.exceeded());
        assert!(budget.remaining() > Duration::from_secs(800));
    }

    #[test]
    fn test_margin_larger_than_ceiling_saturates() {
        let budget = ExecutionBudget::new(Duration::from_secs(10), Duration::from_secs(60));
        assert!(!budget.has_time_remaining());
    }
}
