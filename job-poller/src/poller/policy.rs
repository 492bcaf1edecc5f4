//! Retry schedule for a poller.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// One entry is consumed per failed poll. The consumed entry is sent to
    /// the backend as the long-poll wait of the retry.
    pub retry_delays: Vec<Duration>,
    /// Fixed pause before each retry.
    pub retry_pause: Duration,
    /// Client-side request timeout on top of the long-poll wait.
    pub request_grace: Duration,
}

impl PollPolicy {
    /// Sum of the schedule, i.e. how long the backend may hold retries in total.
    pub fn total_budget(&self) -> Duration {
        self.retry_delays.iter().sum()
    }

    /// Long-poll wait for a poll that does not consume a retry.
    pub fn initial_wait(&self) -> Duration {
        self.retry_delays.first().copied().unwrap_or(self.retry_pause)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        crate::config::Config::default().poll_policy()
    }
}

/// Remaining retries of one poller. Reset whenever the job makes progress.
#[derive(Debug)]
pub(crate) struct RetryBudget {
    delays: Vec<Duration>,
    next: usize,
}

impl RetryBudget {
    pub(crate) fn new(delays: &[Duration]) -> Self {
        Self {
            delays: delays.to_vec(),
            next: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.next = 0;
    }

    pub(crate) fn take(&mut self) -> Option<Duration> {
        let delay = self.delays.get(self.next).copied()?;
        self.next += 1;
        Some(delay)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.delays.len() - self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exhausts_and_resets() {
        let delays = [Duration::from_millis(1), Duration::from_millis(2)];
        let mut budget = RetryBudget::new(&delays);
        assert_eq!(budget.take(), Some(Duration::from_millis(1)));
        assert_eq!(budget.remaining(), 1);
        assert_eq!(budget.take(), Some(Duration::from_millis(2)));
        assert_eq!(budget.take(), None);
        assert_eq!(budget.remaining(), 0);

        budget.reset();
        assert_eq!(budget.take(), Some(Duration::from_millis(1)));
    }

    #[test]
    fn test_initial_wait_falls_back_to_pause() {
        let policy = PollPolicy {
            retry_delays: vec![],
            retry_pause: Duration::from_millis(250),
            request_grace: Duration::ZERO,
        };
        assert_eq!(policy.initial_wait(), Duration::from_millis(250));
        assert_eq!(policy.total_budget(), Duration::ZERO);
    }
}
