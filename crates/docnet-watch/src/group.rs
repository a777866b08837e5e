//! Convergence across several observation channels.
//!
//! A [`ConvergenceGroup`] holds one watcher per channel (typically one
//! feed per node) and waits for the same expected set on all of them.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use futures::future::try_join_all;
use tracing::info;

use crate::error::Result;
use crate::watcher::Watcher;

/// A set of watchers that must all observe the expected events.
#[derive(Debug)]
pub struct ConvergenceGroup<T> {
    watchers: Vec<Watcher<T>>,
}

impl<T> ConvergenceGroup<T>
where
    T: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
{
    /// Create an empty group.
    pub fn new() -> Self {
        Self {
            watchers: Vec::new(),
        }
    }

    /// Add a watcher to the group.
    pub fn push(&mut self, watcher: Watcher<T>) {
        self.watchers.push(watcher);
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, watcher: Watcher<T>) -> Self {
        self.push(watcher);
        self
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    /// Whether the group has no channels.
    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// The member watchers.
    pub fn watchers(&self) -> &[Watcher<T>] {
        &self.watchers
    }

    /// Wait on every channel concurrently.
    ///
    /// Fails with the first error; the error carries the failing channel's
    /// label.
    pub async fn wait_for_events(&mut self, expected: &HashSet<T>) -> Result<()> {
        try_join_all(
            self.watchers
                .iter_mut()
                .map(|watcher| watcher.wait_for_events(expected)),
        )
        .await?;

        info!(
            channels = self.watchers.len(),
            events = expected.len(),
            "converged on all channels"
        );
        Ok(())
    }

    /// Close every member. Idempotent.
    pub async fn close(&mut self) {
        for watcher in &mut self.watchers {
            watcher.close().await;
        }
    }
}

impl<T> Default for ConvergenceGroup<T> {
    fn default() -> Self {
        Self {
            watchers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatchError;
    use crate::source::memory;
    use crate::watcher::{WatchConfig, WatcherState};
    use std::time::Duration;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn config() -> WatchConfig {
        WatchConfig::default()
            .with_max_wait(Duration::from_millis(300))
            .with_poll_interval(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_group_waits_on_all_channels() {
        let (feed1, source1) = memory::channel();
        let (feed2, source2) = memory::channel();

        let mut group = ConvergenceGroup::new()
            .with(Watcher::raw("node1", source1, config()))
            .with(Watcher::raw("node2", source2, config()));
        assert_eq!(group.len(), 2);

        for tip in ["t1", "t2"] {
            feed1.send(tip);
            feed2.send(tip);
        }

        group.wait_for_events(&set(&["t1", "t2"])).await.unwrap();
        group.close().await;

        assert!(feed1.is_closed());
        assert!(feed2.is_closed());
        assert!(group
            .watchers()
            .iter()
            .all(|w| w.state() == WatcherState::Closed));
    }

    #[tokio::test]
    async fn test_group_reports_lagging_channel() {
        let (feed1, source1) = memory::channel();
        let (feed2, source2) = memory::channel();

        let mut group = ConvergenceGroup::new()
            .with(Watcher::raw("node1", source1, config()))
            .with(Watcher::raw("node2", source2, config()));

        feed1.send("t1");
        feed1.send("t2");
        feed2.send("t1");

        let err = group.wait_for_events(&set(&["t1", "t2"])).await.unwrap_err();
        match err {
            WatchError::Timeout(timeout) => {
                assert_eq!(timeout.label, "node2");
                assert_eq!(timeout.missing(), ["t2".to_string()].into_iter().collect());
            }
            other => panic!("expected timeout, got {:?}", other),
        }

        group.close().await;
    }
}
