//! The convergence watcher.
//!
//! A [`Watcher`] owns one event source and one observed set. A background
//! listener decodes every payload and inserts it into the set; callers
//! block on [`Watcher::wait_for_events`] until an expected set is fully
//! contained in what has been observed.
//!
//! ## States
//!
//! ```text
//! Idle --wait_for_events--> Waiting --resolved--> Idle
//!   \                          |
//!    \--------close()----------+-----> Closed (terminal)
//! ```
//!
//! `wait_for_events` takes `&mut self`, so there is never more than one
//! wait in flight on a watcher.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ConvergenceTimeout, Result, WatchError};
use crate::source::EventSource;

/// Configuration for wait behavior.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Deadline for a single `wait_for_events` call.
    pub max_wait: Duration,
    /// Longest gap between two re-checks of the expected set.
    pub poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl WatchConfig {
    /// Set the wait deadline.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Set the re-check interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Lifecycle state of a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Listening, no wait in progress.
    Idle,
    /// A `wait_for_events` call is in progress.
    Waiting,
    /// Subscription ended. Terminal.
    Closed,
}

/// State shared between the listener task and the waiter.
struct Shared<T> {
    inner: Mutex<Observed<T>>,
    notify: Notify,
}

struct Observed<T> {
    events: HashSet<T>,
    /// First fatal listener error, reported to every later wait.
    failure: Option<WatchError>,
}

enum Check {
    Satisfied,
    Pending,
    Failed(WatchError),
}

impl<T: Eq + Hash> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Observed<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an event. Returns true if it was new.
    fn insert(&self, event: T) -> bool {
        let inserted = self.lock().events.insert(event);
        if inserted {
            self.notify.notify_waiters();
        }
        inserted
    }

    fn fail(&self, error: WatchError) {
        {
            let mut inner = self.lock();
            if inner.failure.is_none() {
                inner.failure = Some(error);
            }
        }
        self.notify.notify_waiters();
    }

    fn check(&self, expected: &HashSet<T>) -> Check {
        let inner = self.lock();
        if let Some(err) = &inner.failure {
            return Check::Failed(err.clone());
        }
        if expected.iter().all(|e| inner.events.contains(e)) {
            Check::Satisfied
        } else {
            Check::Pending
        }
    }
}

/// Watches one event channel for an expected set of events.
///
/// The watcher exclusively owns its source. Dropping the watcher cancels
/// the listener, which then closes the source; call [`close`](Self::close)
/// to do so and wait for it.
pub struct Watcher<T> {
    label: String,
    config: WatchConfig,
    state: WatcherState,
    shared: Arc<Shared<T>>,
    shutdown: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl<T> Watcher<T>
where
    T: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
{
    /// Start watching `source`, decoding each payload with `decode`.
    ///
    /// A decode failure stops the listener and is reported by the next
    /// wait.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime. Use
    /// [`try_new`](Self::try_new) to get an error instead.
    pub fn new<S, F, E>(label: impl Into<String>, source: S, decode: F, config: WatchConfig) -> Self
    where
        S: EventSource,
        F: Fn(&str) -> std::result::Result<T, E> + Send + 'static,
        E: fmt::Display + 'static,
    {
        Self::spawn_on(&Handle::current(), label.into(), source, decode, config)
    }

    /// Like [`new`](Self::new), but fails with [`WatchError::NoRuntime`]
    /// outside a tokio runtime.
    pub fn try_new<S, F, E>(label: impl Into<String>, source: S, decode: F, config: WatchConfig) -> Result<Self>
    where
        S: EventSource,
        F: Fn(&str) -> std::result::Result<T, E> + Send + 'static,
        E: fmt::Display + 'static,
    {
        let label = label.into();
        match Handle::try_current() {
            Ok(handle) => Ok(Self::spawn_on(&handle, label, source, decode, config)),
            Err(_) => Err(WatchError::NoRuntime { label }),
        }
    }

    fn spawn_on<S, F, E>(handle: &Handle, label: String, source: S, decode: F, config: WatchConfig) -> Self
    where
        S: EventSource,
        F: Fn(&str) -> std::result::Result<T, E> + Send + 'static,
        E: fmt::Display + 'static,
    {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Observed {
                events: HashSet::new(),
                failure: None,
            }),
            notify: Notify::new(),
        });
        let shutdown = CancellationToken::new();

        let listener = handle.spawn(listen(
            label.clone(),
            source,
            decode,
            Arc::clone(&shared),
            shutdown.clone(),
        ));

        Self {
            label,
            config,
            state: WatcherState::Idle,
            shared,
            shutdown,
            listener: Some(listener),
        }
    }

    /// Label used in logs and diagnostics.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// The wait configuration.
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Number of distinct events observed so far.
    pub fn observed_count(&self) -> usize {
        self.shared.lock().events.len()
    }

    /// Whether `event` has been observed.
    pub fn has_observed(&self, event: &T) -> bool {
        self.shared.lock().events.contains(event)
    }

    /// A copy of the observed set.
    pub fn snapshot(&self) -> HashSet<T> {
        self.shared.lock().events.clone()
    }

    /// Wait until every event in `expected` has been observed.
    ///
    /// An empty expected set succeeds immediately. Fails with
    /// [`WatchError::Timeout`] after `config.max_wait`.
    pub async fn wait_for_events(&mut self, expected: &HashSet<T>) -> Result<()> {
        self.wait(expected, None).await
    }

    /// Like [`wait_for_events`](Self::wait_for_events), but also resolves
    /// with [`WatchError::Cancelled`] once `cancel` fires.
    pub async fn wait_for_events_until(
        &mut self,
        expected: &HashSet<T>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.wait(expected, Some(cancel)).await
    }

    async fn wait(&mut self, expected: &HashSet<T>, cancel: Option<&CancellationToken>) -> Result<()> {
        if self.state == WatcherState::Closed {
            return Err(WatchError::Closed);
        }
        if expected.is_empty() {
            return Ok(());
        }

        let guard = WaitGuard::enter(&mut self.state);
        let result = wait_until_observed(&self.label, &self.shared, &self.config, expected, cancel).await;
        drop(guard);
        result
    }

    /// Stop listening and close the source. Idempotent.
    pub async fn close(&mut self) {
        self.state = WatcherState::Closed;
        self.shutdown.cancel();

        if let Some(listener) = self.listener.take() {
            if let Err(e) = listener.await {
                warn!(label = %self.label, "listener task failed: {}", e);
            }
            debug!(label = %self.label, "watcher closed");
        }
    }
}

impl Watcher<String> {
    /// Watch `source` using the raw payload as the event identifier.
    pub fn raw<S: EventSource>(label: impl Into<String>, source: S, config: WatchConfig) -> Self {
        Self::new(
            label,
            source,
            |raw: &str| Ok::<_, std::convert::Infallible>(raw.to_string()),
            config,
        )
    }
}

impl<T> Drop for Watcher<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<T> fmt::Debug for Watcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("label", &self.label)
            .field("state", &self.state)
            .finish()
    }
}

/// Puts the watcher back to `Idle` when a wait ends or is dropped.
struct WaitGuard<'a>(&'a mut WatcherState);

impl<'a> WaitGuard<'a> {
    fn enter(state: &'a mut WatcherState) -> Self {
        *state = WatcherState::Waiting;
        Self(state)
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if *self.0 == WatcherState::Waiting {
            *self.0 = WatcherState::Idle;
        }
    }
}

async fn wait_until_observed<T>(
    label: &str,
    shared: &Shared<T>,
    config: &WatchConfig,
    expected: &HashSet<T>,
    cancel: Option<&CancellationToken>,
) -> Result<()>
where
    T: Eq + Hash + fmt::Display,
{
    let started = Instant::now();
    let deadline = started + config.max_wait;

    loop {
        // Register for wakeups before checking, so an insertion between the
        // check and the select is not missed.
        let notified = shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        match shared.check(expected) {
            Check::Satisfied => {
                debug!(label, expected = expected.len(), "all expected events observed");
                return Ok(());
            }
            Check::Failed(err) => return Err(err),
            Check::Pending => {}
        }

        let now = Instant::now();
        if now >= deadline {
            let timeout = timeout_report(label, shared, expected, now - started);
            warn!(label, missing = timeout.missing().len(), "convergence timeout");
            return Err(timeout.into());
        }

        let next_check = deadline.min(now + config.poll_interval);
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancelled => return Err(WatchError::Cancelled),
            _ = &mut notified => {}
            _ = tokio::time::sleep_until(next_check) => {}
        }
    }
}

fn timeout_report<T>(
    label: &str,
    shared: &Shared<T>,
    expected: &HashSet<T>,
    waited: Duration,
) -> ConvergenceTimeout
where
    T: Eq + Hash + fmt::Display,
{
    let observed: BTreeSet<String> = shared.lock().events.iter().map(|e| e.to_string()).collect();
    ConvergenceTimeout {
        label: label.to_string(),
        expected: expected.iter().map(|e| e.to_string()).collect(),
        observed,
        waited,
    }
}

/// Listener loop: pull, decode, insert until shut down or failed.
async fn listen<T, S, F, E>(
    label: String,
    mut source: S,
    decode: F,
    shared: Arc<Shared<T>>,
    shutdown: CancellationToken,
) where
    T: Eq + Hash + fmt::Display,
    S: EventSource,
    F: Fn(&str) -> std::result::Result<T, E>,
    E: fmt::Display,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = source.next_message() => next,
        };

        match next {
            Ok(Some(raw)) => match decode(&raw) {
                Ok(event) => {
                    debug!(label = %label, event = %event, "observed event");
                    shared.insert(event);
                }
                Err(e) => {
                    warn!(label = %label, "undecodable payload: {}", e);
                    shared.fail(WatchError::Decode {
                        label: label.clone(),
                        reason: e.to_string(),
                        payload: raw,
                    });
                    break;
                }
            },
            Ok(None) => {
                debug!(label = %label, "event source ended");
                break;
            }
            Err(e) => {
                warn!(label = %label, "event source failed: {}", e);
                shared.fail(WatchError::Channel {
                    label: label.clone(),
                    message: e.to_string(),
                });
                break;
            }
        }
    }

    source.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::memory;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn fast_config() -> WatchConfig {
        WatchConfig::default()
            .with_max_wait(Duration::from_secs(2))
            .with_poll_interval(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_injected_tips_then_missing_tip() {
        let (feed, source) = memory::channel();
        let mut watcher = Watcher::raw("node1", source, fast_config());

        feed.send("tip1");
        feed.send("tip2");
        feed.send("tip3");

        watcher
            .wait_for_events(&set(&["tip1", "tip2", "tip3"]))
            .await
            .unwrap();

        let err = watcher.wait_for_events(&set(&["tip4"])).await.unwrap_err();
        let timeout = err.as_timeout().expect("expected a timeout");
        assert_eq!(timeout.missing(), ["tip4".to_string()].into_iter().collect());
        assert_eq!(timeout.observed.len(), 3);

        watcher.close().await;
        assert!(feed.is_closed());
    }

    #[tokio::test]
    async fn test_empty_expectation_is_immediate() {
        let (_feed, source) = memory::channel();
        let mut watcher = Watcher::raw("empty", source, fast_config());

        watcher.wait_for_events(&HashSet::new()).await.unwrap();
        assert_eq!(watcher.state(), WatcherState::Idle);
    }

    #[tokio::test]
    async fn test_order_independence() {
        let (feed, source) = memory::channel();
        let mut watcher = Watcher::raw("order", source, fast_config());

        feed.send("b");
        feed.send("a");

        watcher.wait_for_events(&set(&["a", "b"])).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicates_collapse() {
        let (feed, source) = memory::channel();
        let mut watcher = Watcher::raw("dupes", source, fast_config());

        feed.send("same");
        feed.send("same");
        feed.send("other");

        watcher.wait_for_events(&set(&["same", "other"])).await.unwrap();
        assert_eq!(watcher.observed_count(), 2);
    }

    #[tokio::test]
    async fn test_events_arriving_during_wait() {
        let (feed, source) = memory::channel();
        let mut watcher = Watcher::raw("late", source, fast_config());

        let producer = tokio::spawn(async move {
            for tip in ["x", "y", "z"] {
                tokio::time::sleep(Duration::from_millis(20)).await;
                feed.send(tip);
            }
            feed
        });

        watcher.wait_for_events(&set(&["x", "y", "z"])).await.unwrap();
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_monotonic_across_waits() {
        let (feed, source) = memory::channel();
        let mut watcher = Watcher::raw("mono", source, fast_config());

        feed.send("e1");
        watcher.wait_for_events(&set(&["e1"])).await.unwrap();

        feed.send("e2");
        watcher.wait_for_events(&set(&["e2"])).await.unwrap();

        // Earlier expectations stay satisfied.
        watcher.wait_for_events(&set(&["e1", "e2"])).await.unwrap();
        assert!(watcher.has_observed(&"e1".to_string()));
    }

    #[tokio::test]
    async fn test_partial_arrival_report() {
        let (feed, source) = memory::channel();
        let config = fast_config().with_max_wait(Duration::from_millis(200));
        let mut watcher = Watcher::raw("partial", source, config);

        feed.send("a");
        feed.send("b");

        let err = watcher.wait_for_events(&set(&["a", "b", "c"])).await.unwrap_err();
        let timeout = err.as_timeout().unwrap();

        let ab: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(timeout.matched(), ab);
        assert_eq!(timeout.missing(), ["c".to_string()].into_iter().collect());
        assert_eq!(timeout.label, "partial");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_respects_deadline() {
        let (_feed, source) = memory::channel();
        let config = WatchConfig::default()
            .with_max_wait(Duration::from_secs(10))
            .with_poll_interval(Duration::from_millis(100));
        let mut watcher = Watcher::raw("deadline", source, config);

        let started = Instant::now();
        let err = watcher.wait_for_events(&set(&["x"])).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(err.is_timeout());
        assert!(elapsed >= Duration::from_secs(10), "returned early: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(10) + Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_decode_failure_is_fatal() {
        let (feed, source) = memory::channel();
        let mut watcher = Watcher::new(
            "numbers",
            source,
            |raw: &str| raw.parse::<u32>(),
            fast_config(),
        );

        feed.send("1");
        feed.send("not-a-number");
        feed.send("2");

        let expected: HashSet<u32> = [1, 2].into_iter().collect();
        let err = watcher.wait_for_events(&expected).await.unwrap_err();
        match err {
            WatchError::Decode { payload, label, .. } => {
                assert_eq!(payload, "not-a-number");
                assert_eq!(label, "numbers");
            }
            other => panic!("expected decode error, got {:?}", other),
        }
        assert!(!watcher.has_observed(&2));
    }

    #[tokio::test]
    async fn test_channel_error_propagates() {
        let (feed, source) = memory::channel();
        let mut watcher = Watcher::raw("flaky", source, fast_config());

        feed.fail("connection reset by peer");

        let err = watcher.wait_for_events(&set(&["x"])).await.unwrap_err();
        assert!(matches!(err, WatchError::Channel { ref message, .. } if message == "connection reset by peer"));
    }

    #[tokio::test]
    async fn test_cancellation_short_circuits() {
        let (_feed, source) = memory::channel();
        let mut watcher = Watcher::raw("cancel", source, WatchConfig::default());
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = watcher
            .wait_for_events_until(&set(&["never"]), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::Cancelled));
        assert_eq!(watcher.state(), WatcherState::Idle);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (feed, source) = memory::channel();
        let mut watcher = Watcher::raw("close", source, fast_config());

        watcher.close().await;
        watcher.close().await;

        assert_eq!(watcher.state(), WatcherState::Closed);
        assert!(feed.is_closed());
        assert!(matches!(
            watcher.wait_for_events(&set(&["x"])).await,
            Err(WatchError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_drop_releases_source() {
        let (feed, source) = memory::channel();
        let watcher = Watcher::raw("dropped", source, fast_config());
        drop(watcher);

        // The listener observes the cancellation and closes the source.
        for _ in 0..50 {
            if feed.is_closed() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("source was not closed after drop");
    }

    #[test]
    fn test_try_new_outside_runtime() {
        let (_feed, source) = memory::channel();
        let result = Watcher::try_new("orphan", source, |raw: &str| raw.parse::<String>(), fast_config());
        assert!(matches!(result, Err(WatchError::NoRuntime { ref label }) if label == "orphan"));
    }

    #[tokio::test]
    async fn test_try_new_inside_runtime() {
        let (feed, source) = memory::channel();
        let mut watcher =
            Watcher::try_new("node1", source, |raw: &str| raw.parse::<String>(), fast_config()).unwrap();

        feed.send("tip1");
        watcher.wait_for_events(&set(&["tip1"])).await.unwrap();
        watcher.close().await;
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn runtime() -> tokio::runtime::Runtime {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn any_delivery_order_with_duplicates_converges(
                tips in prop::collection::hash_set("[a-z0-9]{4,12}", 1..16),
                seed in any::<u64>(),
                dupes in 0usize..8,
            ) {
                let mut delivery: Vec<String> = tips.iter().cloned().collect();
                for i in 0..dupes {
                    let pick = delivery[(seed as usize + i) % delivery.len()].clone();
                    delivery.push(pick);
                }
                // Deterministic shuffle from the seed.
                let len = delivery.len();
                for i in (1..len).rev() {
                    let j = (seed.wrapping_mul(i as u64 + 7) % (i as u64 + 1)) as usize;
                    delivery.swap(i, j);
                }

                let observed = runtime().block_on(async move {
                    let (feed, source) = memory::channel();
                    let mut watcher = Watcher::raw("prop", source, fast_config());
                    for tip in &delivery {
                        feed.send(tip.clone());
                    }
                    watcher.wait_for_events(&tips).await.unwrap();
                    let count = watcher.observed_count();
                    watcher.close().await;
                    (count, tips.len())
                });

                prop_assert_eq!(observed.0, observed.1);
            }
        }
    }
}
