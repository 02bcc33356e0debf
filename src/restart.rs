//! Process-level restart loop around the supervisor.
//!
//! [`supervise`] keeps re-invoking a run future for as long as it fails. The
//! loop owns nothing but the backoff state: outlets and inlets live outside it
//! and are handed to every attempt unchanged, so a restart only rebuilds the
//! listening socket and the session.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use holo_bridge::{Bridge, BridgeMetrics, InletMap, OutletMap};
//! use holo_bridge::restart::{RestartPolicy, supervise};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let metrics = Arc::new(BridgeMetrics::new());
//! let bridge = Arc::new(
//!     Bridge::new("0.0.0.0", 10000, OutletMap::new(), InletMap::new()).with_metrics(metrics.clone()),
//! );
//! let stop = CancellationToken::new();
//!
//! supervise(RestartPolicy::default(), stop.clone(), &metrics, || {
//!     let bridge = Arc::clone(&bridge);
//!     let stop = stop.clone();
//!     async move { bridge.run_until(stop).await }
//! })
//! .await;
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::Result;
use crate::metrics::BridgeMetrics;

/// Backoff between restart attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicy {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self { initial_backoff_ms: 50, max_backoff_ms: 5_000 }
    }
}

impl RestartPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial_backoff_ms: initial.as_millis() as u64,
            max_backoff_ms: max.as_millis() as u64,
        }
    }

    /// Delay before restart number `attempt` (0-based): doubles from the initial
    /// backoff and never exceeds the maximum.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        let millis = self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms.max(self.initial_backoff_ms));
        Duration::from_millis(millis)
    }
}

/// Run `make_run()` until one attempt returns `Ok` or `stop` is cancelled.
///
/// Every `Err` is logged, counted in [`BridgeMetrics::supervisor_faults`] and
/// followed by a backoff sleep. Returns the number of failed attempts.
pub async fn supervise<F, Fut>(
    policy: RestartPolicy,
    stop: CancellationToken,
    metrics: &BridgeMetrics,
    mut make_run: F,
) -> u32
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut failures = 0u32;

    loop {
        if stop.is_cancelled() {
            break;
        }

        match make_run().await {
            Ok(()) => {
                info!(restarts = failures, "Bridge stopped");
                break;
            }
            Err(e) => {
                BridgeMetrics::bump(&metrics.supervisor_faults);
                let backoff = policy.backoff(failures);
                failures = failures.saturating_add(1);
                error!(
                    attempt = failures,
                    backoff_ms = backoff.as_millis() as u64,
                    "Bridge failed, restarting: {}",
                    e
                );
                for suggestion in e.recovery_suggestions() {
                    info!("  - {}", suggestion);
                }

                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RestartPolicy::new(Duration::from_millis(50), Duration::from_millis(300));
        let delays: Vec<_> = (0..6).map(|n| policy.backoff(n).as_millis()).collect();
        assert_eq!(delays, vec![50, 100, 200, 300, 300, 300]);
        assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(300));
    }

    #[test]
    fn max_below_initial_uses_initial() {
        let policy = RestartPolicy::new(Duration::from_millis(200), Duration::from_millis(10));
        assert_eq!(policy.backoff(0), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn failing_runs_are_retried_until_success() {
        let metrics = BridgeMetrics::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let policy = RestartPolicy::new(Duration::from_millis(1), Duration::from_millis(4));

        let failures = supervise(policy, CancellationToken::new(), &metrics, || {
            let attempts = Arc::clone(&attempts);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(BridgeError::supervisor_fault("bind failed"))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(failures, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(metrics.snapshot().supervisor_faults, 3);
    }

    #[tokio::test]
    async fn stop_interrupts_backoff() {
        let metrics = BridgeMetrics::new();
        let stop = CancellationToken::new();
        let policy = RestartPolicy::new(Duration::from_secs(60), Duration::from_secs(60));

        let canceller = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let failures = tokio::time::timeout(
            Duration::from_secs(5),
            supervise(policy, stop, &metrics, || async { Err(BridgeError::supervisor_fault("down")) }),
        )
        .await
        .expect("cancellation should cut the backoff short");

        assert_eq!(failures, 1);
    }
}
