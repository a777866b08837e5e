//! Event source abstraction.
//!
//! An event source is a push channel delivering raw payloads, such as a
//! Server-Sent Events stream from a node. Implementations own their
//! connection; reconnection policy, if any, belongs to them.

use async_trait::async_trait;

use crate::error::SourceError;

/// A push channel of raw event payloads.
///
/// Delivery is assumed at-least-once with no ordering guarantee.
#[async_trait]
pub trait EventSource: Send + 'static {
    /// Wait for the next payload.
    ///
    /// Returns `Ok(None)` once the source has ended and will deliver
    /// nothing further. Must be cancel-safe: dropping the future must not
    /// lose a payload.
    async fn next_message(&mut self) -> Result<Option<String>, SourceError>;

    /// Close the underlying subscription. Idempotent.
    async fn close(&mut self);
}

#[async_trait]
impl EventSource for Box<dyn EventSource> {
    async fn next_message(&mut self) -> Result<Option<String>, SourceError> {
        (**self).next_message().await
    }

    async fn close(&mut self) {
        (**self).close().await
    }
}

/// An in-memory event source for tests and fake networks.
///
/// Payloads pushed through a [`MemoryFeed`] come out of the paired
/// [`MemorySource`] in order.
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    type Item = Result<String, SourceError>;

    /// Create a connected feed/source pair.
    pub fn channel() -> (MemoryFeed, MemorySource) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let feed = MemoryFeed {
            tx,
            closed: Arc::clone(&closed),
        };
        let source = MemorySource { rx, closed };
        (feed, source)
    }

    /// Sending half: injects payloads or failures.
    #[derive(Clone)]
    pub struct MemoryFeed {
        tx: mpsc::UnboundedSender<Item>,
        closed: Arc<AtomicBool>,
    }

    impl MemoryFeed {
        /// Deliver a payload. Returns false if the source is gone.
        pub fn send(&self, raw: impl Into<String>) -> bool {
            !self.is_closed() && self.tx.send(Ok(raw.into())).is_ok()
        }

        /// Deliver a connection failure.
        pub fn fail(&self, message: impl Into<String>) -> bool {
            !self.is_closed() && self.tx.send(Err(SourceError::new(message))).is_ok()
        }

        /// Whether the receiving source was closed or dropped.
        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
        }
    }

    /// Receiving half.
    pub struct MemorySource {
        rx: mpsc::UnboundedReceiver<Item>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl EventSource for MemorySource {
        async fn next_message(&mut self) -> Result<Option<String>, SourceError> {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }
            match self.rx.recv().await {
                Some(item) => item.map(Some),
                None => Ok(None),
            }
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
            self.rx.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory;
    use super::*;

    #[tokio::test]
    async fn test_memory_source_delivers_in_order() {
        let (feed, mut source) = memory::channel();

        assert!(feed.send("a"));
        assert!(feed.send("b"));

        assert_eq!(source.next_message().await.unwrap(), Some("a".to_string()));
        assert_eq!(source.next_message().await.unwrap(), Some("b".to_string()));
    }

    #[tokio::test]
    async fn test_memory_source_failure() {
        let (feed, mut source) = memory::channel();
        feed.fail("connection reset");

        let err = source.next_message().await.unwrap_err();
        assert_eq!(err, SourceError::new("connection reset"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_visible() {
        let (feed, mut source) = memory::channel();
        assert!(!feed.is_closed());

        source.close().await;
        source.close().await;

        assert!(feed.is_closed());
        assert!(!feed.send("late"));
        assert_eq!(source.next_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_boxed_source() {
        let (feed, source) = memory::channel();
        let mut boxed: Box<dyn EventSource> = Box::new(source);

        feed.send("x");
        assert_eq!(boxed.next_message().await.unwrap(), Some("x".to_string()));
        boxed.close().await;
        assert!(feed.is_closed());
    }
}
