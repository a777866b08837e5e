//! # Docnet Watch
//!
//! Wait until an expected set of events has been observed on a push
//! channel.
//!
//! ## Overview
//!
//! Nodes in a document network replicate asynchronously. A write on one
//! node becomes visible on another some time later, and change feeds
//! deliver notifications at-least-once and in no particular order. Tests
//! that assert cross-node behavior therefore need to wait for a set of
//! events, not a sequence.
//!
//! A [`Watcher`] subscribes to one [`EventSource`], decodes each payload
//! into an identifier and accumulates the identifiers in a monotonic set.
//! [`Watcher::wait_for_events`] resolves once an expected set is a subset
//! of what has been observed, or fails with a [`ConvergenceTimeout`] that
//! lists what did and did not arrive.
//!
//! ## Key Properties
//!
//! - **Order-independent**: only set membership matters
//! - **Duplicate-tolerant**: repeated deliveries collapse
//! - **Monotonic**: an event once observed stays observed
//! - **Bounded**: every wait has a deadline
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::HashSet;
//! use docnet_watch::{memory, WatchConfig, Watcher};
//!
//! async fn example() -> docnet_watch::Result<()> {
//!     let (feed, source) = memory::channel();
//!     let mut watcher = Watcher::raw("node1", source, WatchConfig::default());
//!
//!     feed.send("tip1");
//!     feed.send("tip2");
//!
//!     let expected: HashSet<String> = ["tip1", "tip2"].iter().map(|s| s.to_string()).collect();
//!     watcher.wait_for_events(&expected).await?;
//!     watcher.close().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod group;
pub mod poll;
pub mod source;
pub mod watcher;

pub use error::{ConvergenceTimeout, Result, SourceError, WatchError};
pub use group::ConvergenceGroup;
pub use poll::{wait_for_condition, DEFAULT_CONDITION_INTERVAL, DEFAULT_CONDITION_TIMEOUT};
pub use source::{memory, EventSource};
pub use watcher::{WatchConfig, Watcher, WatcherState};

pub use tokio_util::sync::CancellationToken;
