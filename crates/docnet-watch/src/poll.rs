//! Condition polling.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Default timeout for [`wait_for_condition`] callers.
pub const DEFAULT_CONDITION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between predicate evaluations.
pub const DEFAULT_CONDITION_INTERVAL: Duration = Duration::from_millis(100);

/// Evaluate `predicate` every `interval` until it holds or `timeout` elapses.
///
/// Returns whether the predicate held. The predicate is always evaluated
/// at least once, and once more at the deadline.
pub async fn wait_for_condition<F, Fut>(mut predicate: F, timeout: Duration, interval: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if predicate().await {
            return true;
        }

        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        sleep_until(deadline.min(now + interval)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_condition_met_after_a_few_polls() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let met = wait_for_condition(
            move || async move { calls.fetch_add(1, Ordering::SeqCst) >= 3 },
            Duration::from_secs(1),
            Duration::from_millis(100),
        )
        .await;

        assert!(met);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_condition_times_out() {
        let started = Instant::now();

        let met = wait_for_condition(
            || async { false },
            Duration::from_secs(2),
            Duration::from_millis(100),
        )
        .await;

        assert!(!met);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
