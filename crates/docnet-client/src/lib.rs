//! # Docnet Client
//!
//! Clients for the nodes of a document network.
//!
//! ## Overview
//!
//! - [`NodeClient`] is the contract the suite drives: create and load
//!   models and documents, manage indexing, open the change feed.
//! - [`HttpNodeClient`] implements it over a node's HTTP API. Writes are
//!   signed with a `did:key` [`Identity`](docnet_core::Identity); admin
//!   calls are authorized with a JWS over a one-shot code.
//! - [`SseSource`] is the change feed as an
//!   [`EventSource`](docnet_watch::EventSource), and [`decode_tip`] turns a
//!   feed payload into the tip it announces.
//! - [`ComposeClient`] and the query builders talk to a GraphQL endpoint.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docnet_client::{decode_tip, HttpNodeClient, NodeClient};
//! use docnet_core::{Identity, Seed};
//! use docnet_watch::{WatchConfig, Watcher};
//!
//! async fn example(seed: Seed) -> Result<(), Box<dyn std::error::Error>> {
//!     let node = HttpNodeClient::new("http://localhost:7007")?
//!         .with_identity(Identity::from_seed(&seed));
//!
//!     let feed = node.open_feed().await?;
//!     let mut watcher = Watcher::new("node1", feed, decode_tip, WatchConfig::default());
//!     // ... write documents, collect their tips, wait on the watcher
//!     watcher.close().await;
//!     Ok(())
//! }
//! ```

pub mod commit;
pub mod compose;
pub mod error;
pub mod feed;
pub mod http;
pub mod node;

pub use compose::{ComposeClient, TestRecord};
pub use error::{ClientError, Result};
pub use feed::{decode_document, decode_tip, AggregationDocument, SseEvent, SseParser, SseSource, FEED_PATH};
pub use http::HttpNodeClient;
pub use node::{
    AccountRelation, Document, ModelDefinition, NodeClient, StreamMetadata, StreamState,
    MODEL_META_MODEL,
};
