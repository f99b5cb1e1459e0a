//! Supervised polling loop with capped exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::BatchQueueConfig;
use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
        }
    }

    /// `min(base * 2^(n-1), max)` for the n-th consecutive failure (n >= 1).
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

impl From<&BatchQueueConfig> for RetryPolicy {
    fn from(config: &BatchQueueConfig) -> Self {
        Self::new(
            Duration::from_millis(config.retry_base_delay_ms),
            Duration::from_millis(config.retry_max_delay_ms),
            config.max_retries,
        )
    }
}

/// Consecutive-failure counter driven by a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryCounter {
    policy: RetryPolicy,
    failures: u32,
}

impl RetryCounter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// Count a failure. Returns the delay before the next attempt, or `None`
    /// once the retry budget is spent.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures += 1;
        (self.failures < self.policy.max_retries).then(|| self.policy.delay(self.failures))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Something was processed; poll again right away.
    Worked,
    /// Nothing to do; sleep one poll interval.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Stopped,
    /// Gave up after `failures` consecutive faults.
    Halted { failures: u32 },
}

/// Run `iteration` until cancelled or until it fails `max_retries` times in a row.
///
/// An in-flight iteration is allowed to finish; cancellation is observed
/// between iterations and during sleeps.
pub async fn supervise<F, Fut>(
    name: &str,
    policy: RetryPolicy,
    poll_interval: Duration,
    token: CancellationToken,
    mut iteration: F,
) -> LoopExit
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<PollOutcome>>,
{
    let mut counter = RetryCounter::new(policy);

    loop {
        if token.is_cancelled() {
            return LoopExit::Stopped;
        }

        let pause = match iteration().await {
            Ok(outcome) => {
                if counter.failures() > 0 {
                    tracing::info!(loop_name = name, "Recovered after {} failure(s)", counter.failures());
                }
                counter.record_success();
                match outcome {
                    PollOutcome::Worked => None,
                    PollOutcome::Idle => Some(poll_interval),
                }
            }
            Err(e) => match counter.record_failure() {
                Some(delay) => {
                    tracing::warn!(
                        loop_name = name,
                        retry = counter.failures(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Poll iteration failed, backing off"
                    );
                    Some(delay)
                }
                None => {
                    tracing::error!(
                        loop_name = name,
                        retry = counter.failures(),
                        error = %e,
                        "Poll loop halted after too many consecutive failures"
                    );
                    return LoopExit::Halted {
                        failures: counter.failures(),
                    };
                }
            },
        };

        if let Some(pause) = pause {
            tokio::select! {
                _ = token.cancelled() => return LoopExit::Stopped,
                _ = tokio::time::sleep(pause) => {}
            }
        } else {
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(60), max_retries)
    }

    fn fault() -> AppError {
        AppError::ConnectionPool {
            source: anyhow::anyhow!("connection refused"),
        }
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let p = policy(10);
        let delays: Vec<u64> = (1..=8).map(|n| p.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn test_counter_resets_after_success() {
        let mut counter = RetryCounter::new(policy(5));
        assert_eq!(counter.record_failure(), Some(Duration::from_secs(1)));
        assert_eq!(counter.record_failure(), Some(Duration::from_secs(2)));
        assert_eq!(counter.record_failure(), Some(Duration::from_secs(4)));
        counter.record_success();
        assert_eq!(counter.failures(), 0);
        assert_eq!(counter.record_failure(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_counter_exhausts_at_max_retries() {
        let mut counter = RetryCounter::new(policy(3));
        assert!(counter.record_failure().is_some());
        assert!(counter.record_failure().is_some());
        assert_eq!(counter.record_failure(), None);
    }

    proptest! {
        #[test]
        fn prop_delay_is_bounded_and_non_decreasing(
            base_ms in 1u64..5_000,
            cap_ms in 1u64..120_000,
            n in 1u32..64,
        ) {
            let p = RetryPolicy::new(
                Duration::from_millis(base_ms),
                Duration::from_millis(cap_ms),
                100,
            );
            prop_assert!(p.delay(n) <= Duration::from_millis(cap_ms));
            prop_assert!(p.delay(n) <= p.delay(n + 1));
            if n == 1 {
                prop_assert_eq!(p.delay(1), Duration::from_millis(base_ms.min(cap_ms)));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_backs_off_then_resets_after_success() {
        let token = CancellationToken::new();
        let calls: Arc<Mutex<Vec<Instant>>> = Arc::default();

        let exit = {
            let token = token.clone();
            let calls = calls.clone();
            supervise("test", policy(5), Duration::from_secs(5), token.clone(), move || {
                let token = token.clone();
                let calls = calls.clone();
                async move {
                    let n = {
                        let mut calls = calls.lock().unwrap();
                        calls.push(Instant::now());
                        calls.len()
                    };
                    match n {
                        1..=3 => Err(fault()),
                        4 => Ok(PollOutcome::Idle),
                        5 => Err(fault()),
                        _ => {
                            token.cancel();
                            Ok(PollOutcome::Idle)
                        }
                    }
                }
            })
            .await
        };

        assert_eq!(exit, LoopExit::Stopped);
        let calls = calls.lock().unwrap();
        let gaps: Vec<u64> = calls.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
        // 1s, 2s, 4s of backoff, one idle interval, then the next fault starts at 1s again.
        assert_eq!(gaps, vec![1, 2, 4, 5, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_halts_after_max_retries() {
        let attempts = Arc::new(Mutex::new(0u32));
        let counted = attempts.clone();
        let exit = supervise(
            "test",
            policy(3),
            Duration::from_secs(5),
            CancellationToken::new(),
            move || {
                let counted = counted.clone();
                async move {
                    *counted.lock().unwrap() += 1;
                    Err::<PollOutcome, _>(fault())
                }
            },
        )
        .await;

        assert_eq!(exit, LoopExit::Halted { failures: 3 });
        assert_eq!(*attempts.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_supervise_stops_when_cancelled_up_front() {
        let token = CancellationToken::new();
        token.cancel();
        let exit = supervise("test", policy(3), Duration::from_secs(5), token, || async {
            Ok(PollOutcome::Worked)
        })
        .await;
        assert_eq!(exit, LoopExit::Stopped);
    }
}
