//! # Docnet Testkit
//!
//! Testing utilities for the docnet convergence suite.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fake network**: an in-memory network whose nodes implement
//!   [`NodeClient`](docnet_client::NodeClient), with configurable
//!   replication delay and partitions
//! - **Fixtures**: deterministic identities, a small test model, a
//!   two-node setup and tracing initialization
//! - **Generators**: proptest strategies for tips and delivery schedules
//!
//! ## Fake Network
//!
//! ```rust
//! use docnet_testkit::fixtures::{test_model, TwoNodeFixture};
//! use docnet_client::NodeClient;
//! use serde_json::json;
//!
//! # async fn example() -> docnet_client::Result<()> {
//! let fixture = TwoNodeFixture::new();
//! let model = fixture.indexed_model(&test_model()).await?;
//!
//! let doc = fixture.node1.create_document(&model, json!({ "myData": 1 })).await?;
//! let seen = fixture.node2.load_document(&doc.id).await?;
//! assert_eq!(seen.tip, doc.tip);
//! # Ok(())
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use docnet_testkit::generators::tips_with_delivery;
//!
//! proptest! {
//!     #[test]
//!     fn converges_in_any_order((tips, schedule) in tips_with_delivery(16)) {
//!         // deliver `schedule`, wait for `tips`
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod network;

pub use fixtures::{admin_identity, identity, init_tracing, test_model, TwoNodeFixture};
pub use network::{FakeNetwork, FakeNetworkConfig, FakeNode};
