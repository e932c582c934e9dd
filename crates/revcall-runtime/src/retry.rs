//! Retry policies for the registration loop.
//!
//! A policy is a pure function from the history of failed attempts to a
//! decision: retry after some delay, or give up. Giving up is final for the
//! registration. Because the decision depends only on the history, a
//! policy can be exercised by feeding it synthetic failures, without
//! clocks or connections.

use crate::error::AttemptError;
use std::collections::VecDeque;
use std::time::Duration;

/// Number of most recent failures kept for inspection.
const DEFAULT_HISTORY_CAPACITY: usize = 32;

/// Every failed attempt of one registration.
///
/// Counts every failure but only keeps the most recent ones, so a
/// registration retrying for months does not grow without bound. Failures
/// since the last accepted connect are counted separately, so backoff can
/// restart after a healthy connection without resetting the retry budget.
#[derive(Debug, Clone)]
pub struct FailureHistory {
    total: u32,
    since_connected: u32,
    recent: VecDeque<AttemptError>,
    capacity: usize,
}

impl FailureHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            total: 0,
            since_connected: 0,
            recent: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, failure: AttemptError) {
        self.total = self.total.saturating_add(1);
        self.since_connected = self.since_connected.saturating_add(1);
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(failure);
    }

    /// Note that an attempt got an accepted connect response. Only
    /// [`since_connected`](Self::since_connected) restarts.
    pub fn mark_connected(&mut self) {
        self.since_connected = 0;
    }

    /// Number of failures so far, including ones no longer retained.
    pub fn len(&self) -> u32 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Failures since the last accepted connect, or since the start.
    pub fn since_connected(&self) -> u32 {
        self.since_connected
    }

    pub fn last(&self) -> Option<&AttemptError> {
        self.recent.back()
    }

    /// Retained failures, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &AttemptError> {
        self.recent.iter()
    }
}

impl Default for FailureHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides whether and when the registration loop reconnects.
pub trait RetryPolicy: Send + Sync {
    /// `Some(delay)` to retry after `delay`, `None` to stop retrying.
    fn next_retry(&self, failures: &FailureHistory) -> Option<Duration>;
}

impl<F> RetryPolicy for F
where
    F: Fn(&FailureHistory) -> Option<Duration> + Send + Sync,
{
    fn next_retry(&self, failures: &FailureHistory) -> Option<Duration> {
        self(failures)
    }
}

/// Exponentially growing delay, capped at `max_delay`.
///
/// Retries forever unless `max_retries` is set. The retry budget counts
/// every failure; the delay grows with the failures since the last accepted
/// connect.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    max_retries: Option<u32>,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            max_retries: None,
        }
    }

    /// Multipliers below 1.0 (and NaN) are raised to 1.0.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier >= 1.0 { multiplier } else { 1.0 };
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Delay before retry number `retry` (1-based).
    fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

impl Default for ExponentialBackoff {
    /// One second doubling up to one minute, forever.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_retry(&self, failures: &FailureHistory) -> Option<Duration> {
        if self.max_retries.is_some_and(|max| failures.len() > max) {
            return None;
        }
        Some(self.delay_for(failures.since_connected().max(1)))
    }
}

/// The same delay before every retry.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedDelay {
    delay: Duration,
    max_retries: Option<u32>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

impl RetryPolicy for FixedDelay {
    fn next_retry(&self, failures: &FailureHistory) -> Option<Duration> {
        if self.max_retries.is_some_and(|max| failures.len() > max) {
            return None;
        }
        Some(self.delay)
    }
}

/// Never retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_retry(&self, _failures: &FailureHistory) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HandshakeError, ReverseCallError};
    use revcall_core::{Failure, TransportError};

    fn timeout() -> AttemptError {
        ReverseCallError::DidNotReceiveConnectResponse.into()
    }

    /// Feed `failures` one at a time and collect each decision.
    fn decisions(policy: &dyn RetryPolicy, failures: Vec<AttemptError>) -> Vec<Option<Duration>> {
        let mut history = FailureHistory::new();
        failures
            .into_iter()
            .map(|failure| {
                history.record(failure);
                policy.next_retry(&history)
            })
            .collect()
    }

    #[test]
    fn test_exponential_backoff_grows_and_caps() {
        let policy = ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(3));
        let delays = decisions(&policy, (0..6).map(|_| timeout()).collect());
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(500)),
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(3)),
                Some(Duration::from_secs(3)),
                Some(Duration::from_secs(3)),
            ]
        );
    }

    #[test]
    fn test_exponential_backoff_survives_huge_histories() {
        let policy = ExponentialBackoff::default();
        let mut history = FailureHistory::with_capacity(1);
        for _ in 0..10_000 {
            history.record(timeout());
        }
        assert_eq!(policy.next_retry(&history), Some(Duration::from_secs(60)));
        assert_eq!(history.len(), 10_000);
        assert_eq!(history.iter().count(), 1);
    }

    #[test]
    fn test_max_retries_emits_k_signals_then_completes() {
        let policy = ExponentialBackoff::default().with_max_retries(2);
        let delays = decisions(&policy, (0..3).map(|_| timeout()).collect());
        assert!(delays[0].is_some());
        assert!(delays[1].is_some());
        assert_eq!(delays[2], None);
    }

    #[test]
    fn test_fixed_delay() {
        let policy = FixedDelay::new(Duration::from_millis(250)).with_max_retries(1);
        let delays = decisions(&policy, vec![timeout(), timeout()]);
        assert_eq!(delays, vec![Some(Duration::from_millis(250)), None]);
    }

    #[test]
    fn test_no_retry() {
        assert_eq!(decisions(&NoRetry, vec![timeout()]), vec![None]);
    }

    #[test]
    fn test_closure_policy_inspects_failure_kinds() {
        // Give up as soon as the runtime refuses on version grounds; retry
        // quickly on anything else.
        let policy = |failures: &FailureHistory| match failures.last() {
            Some(AttemptError::Handshake(HandshakeError::IncompatibleVersions { .. })) => None,
            _ => Some(Duration::from_millis(10)),
        };
        let delays = decisions(
            &policy,
            vec![
                AttemptError::Connect(TransportError::Closed),
                ReverseCallError::ConnectFailed(Failure::unknown("busy")).into(),
                HandshakeError::IncompatibleVersions {
                    client: revcall_core::Version::new(2, 0, 0),
                    runtime: revcall_core::Version::new(1, 0, 0),
                }
                .into(),
            ],
        );
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(10)),
                Some(Duration::from_millis(10)),
                None
            ]
        );
    }

    #[test]
    fn test_connect_restarts_backoff_but_not_the_budget() {
        let policy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
            .with_max_retries(3);
        let mut history = FailureHistory::new();
        history.record(timeout());
        history.record(timeout());
        assert_eq!(policy.next_retry(&history), Some(Duration::from_millis(200)));

        history.mark_connected();
        assert_eq!(history.since_connected(), 0);
        history.record(timeout());
        assert_eq!(history.len(), 3);
        assert_eq!(policy.next_retry(&history), Some(Duration::from_millis(100)));

        history.mark_connected();
        history.record(timeout());
        assert_eq!(policy.next_retry(&history), None);
    }

    #[test]
    fn test_multiplier_below_one_is_raised() {
        let policy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
            .with_multiplier(-2.0);
        let delays = decisions(&policy, (0..3).map(|_| timeout()).collect());
        assert_eq!(delays, vec![Some(Duration::from_millis(100)); 3]);

        let policy = ExponentialBackoff::default().with_multiplier(f64::NAN);
        assert_eq!(
            decisions(&policy, vec![timeout(), timeout()]),
            vec![Some(Duration::from_secs(1)), Some(Duration::from_secs(1))]
        );
    }
}
