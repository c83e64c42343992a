//! Bounded sleep-then-repoll waits.
//!
//! Every wait in the supervisor (port bind, termination, health) is the same
//! shape: poll a predicate at a fixed interval for a fixed number of
//! attempts. There is no event-driven notification of process exit.

use std::time::Duration;

/// Outcome of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Predicate held on the given attempt (1-based).
    Satisfied(u32),
    /// Predicate never held within the attempt budget.
    TimedOut,
}

impl WaitOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, WaitOutcome::Satisfied(_))
    }
}

/// Poll `predicate` up to `max_attempts` times, sleeping `interval` between
/// attempts. The first check runs immediately, so a predicate that is already
/// true returns without sleeping.
pub async fn wait_until<F>(interval: Duration, max_attempts: u32, mut predicate: F) -> WaitOutcome
where
    F: FnMut() -> bool,
{
    for attempt in 1..=max_attempts {
        if predicate() {
            return WaitOutcome::Satisfied(attempt);
        }
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }
    WaitOutcome::TimedOut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn immediate_success_does_not_sleep() {
        let start = std::time::Instant::now();
        let outcome = wait_until(Duration::from_secs(5), 3, || true).await;
        assert_eq!(outcome, WaitOutcome::Satisfied(1));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn succeeds_on_later_attempt() {
        let mut calls = 0;
        let outcome = wait_until(Duration::from_millis(10), 5, || {
            calls += 1;
            calls == 3
        })
        .await;
        assert_eq!(outcome, WaitOutcome::Satisfied(3));
    }

    #[tokio::test]
    async fn times_out_after_max_attempts() {
        let mut calls = 0;
        let outcome = wait_until(Duration::from_millis(1), 4, || {
            calls += 1;
            false
        })
        .await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(calls, 4);
    }
}
