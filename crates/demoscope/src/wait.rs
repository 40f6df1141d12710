//! Wait Mechanisms
//!
//! Predicate polling replaces fixed sleeps. A probe is re-run at a fixed
//! interval until the predicate holds or the timeout expires; on expiry the
//! last observed value is carried in the error for diagnosis.

use crate::result::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::future::Future;
use std::time::{Duration, Instant};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (30 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Timeout as a Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Poll interval as a Duration (never zero)
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

// =============================================================================
// WAIT RESULT
// =============================================================================

/// Result of a successful wait operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitResult {
    /// Time spent waiting
    pub elapsed: Duration,
    /// Description of what was waited for
    pub waited_for: String,
    /// Number of probes run, including the satisfying one
    pub attempts: u32,
}

// =============================================================================
// POLLING
// =============================================================================

/// Re-run `probe` until `predicate` holds
///
/// The probe always runs at least once, and once more at the deadline, so a
/// condition that becomes true exactly at expiry is still observed. Probe
/// errors abort the wait immediately.
///
/// # Errors
///
/// Returns `ConditionTimeout` with the last probed value rendered via `Debug`,
/// or the first probe error.
pub async fn poll_until<T, F, Fut, P>(
    waited_for: &str,
    options: &WaitOptions,
    mut probe: F,
    predicate: P,
) -> HarnessResult<(T, WaitResult)>
where
    T: Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<T>>,
    P: Fn(&T) -> bool,
{
    let start = Instant::now();
    let timeout = options.timeout();
    let mut attempts = 0_u32;

    loop {
        attempts += 1;
        let value = probe().await?;
        if predicate(&value) {
            let result = WaitResult {
                elapsed: start.elapsed(),
                waited_for: waited_for.to_string(),
                attempts,
            };
            tracing::debug!(
                waited_for,
                attempts,
                elapsed_ms = result.elapsed.as_millis() as u64,
                "condition satisfied"
            );
            return Ok((value, result));
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            tracing::debug!(waited_for, attempts, "condition timed out");
            return Err(HarnessError::ConditionTimeout {
                waited_for: waited_for.to_string(),
                timeout_ms: options.timeout_ms,
                last_observed: format!("{value:?}"),
            });
        }

        tokio::time::sleep(options.poll_interval().min(timeout - elapsed)).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    mod options_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let opts = WaitOptions::default();
            assert_eq!(opts.timeout_ms, DEFAULT_WAIT_TIMEOUT_MS);
            assert_eq!(opts.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        }

        #[test]
        fn test_builders() {
            let opts = WaitOptions::new().with_timeout(250).with_poll_interval(0);
            assert_eq!(opts.timeout(), Duration::from_millis(250));
            assert_eq!(opts.poll_interval(), Duration::from_millis(1));
        }

        #[test]
        fn test_partial_yaml() {
            let opts: WaitOptions = serde_yaml_ng::from_str("timeout_ms: 500").unwrap();
            assert_eq!(opts.timeout_ms, 500);
            assert_eq!(opts.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        }
    }

    mod poll_tests {
        use super::*;

        #[tokio::test]
        async fn test_immediate_success() {
            let opts = WaitOptions::new().with_timeout(100);
            let (value, result) = poll_until("always", &opts, || async { Ok(7) }, |v| *v == 7)
                .await
                .unwrap();
            assert_eq!(value, 7);
            assert_eq!(result.attempts, 1);
            assert_eq!(result.waited_for, "always");
        }

        #[tokio::test]
        async fn test_returns_first_satisfying_value() {
            let counter = Arc::new(AtomicU32::new(0));
            let opts = WaitOptions::new().with_timeout(1_000).with_poll_interval(5);
            let (value, result) = poll_until(
                "third probe",
                &opts,
                || {
                    let counter = Arc::clone(&counter);
                    async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
                },
                |v| *v >= 3,
            )
            .await
            .unwrap();
            assert_eq!(value, 3);
            assert_eq!(result.attempts, 3);
        }

        #[tokio::test]
        async fn test_timeout_carries_last_value() {
            let opts = WaitOptions::new().with_timeout(40).with_poll_interval(10);
            let start = Instant::now();
            let err = poll_until(
                "never",
                &opts,
                || async { Ok(vec!["bar", "bar sorted"]) },
                |v| v.len() > 5,
            )
            .await
            .unwrap_err();
            assert!(start.elapsed() >= Duration::from_millis(40));
            match err {
                HarnessError::ConditionTimeout {
                    waited_for,
                    timeout_ms,
                    last_observed,
                } => {
                    assert_eq!(waited_for, "never");
                    assert_eq!(timeout_ms, 40);
                    assert!(last_observed.contains("bar sorted"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn test_probe_error_aborts() {
            let opts = WaitOptions::new().with_timeout(1_000);
            let err = poll_until(
                "failing probe",
                &opts,
                || async { Err::<u32, _>(HarnessError::driver("page crashed")) },
                |_| true,
            )
            .await
            .unwrap_err();
            assert!(matches!(err, HarnessError::Driver { .. }));
        }

        #[tokio::test]
        async fn test_zero_timeout_probes_once() {
            let counter = Arc::new(AtomicU32::new(0));
            let opts = WaitOptions::new().with_timeout(0);
            let result = poll_until(
                "zero",
                &opts,
                || {
                    let counter = Arc::clone(&counter);
                    async move { Ok(counter.fetch_add(1, Ordering::SeqCst)) }
                },
                |_| false,
            )
            .await;
            assert!(result.is_err());
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }
}
