//! # Docnet Suite
//!
//! End-to-end convergence tests for a distributed document network.
//!
//! ## Overview
//!
//! The suite connects to two running nodes, writes on one and asserts
//! that the writes reach the other:
//!
//! - **Direct reads**: a document created on node 1 loads on node 2
//! - **Change feeds**: every tip produced on node 1 is announced on the
//!   Server-Sent Events feed of both nodes
//!
//! Feed assertions go through the convergence watcher in
//! [`watch`]: tips are collected as a set and the wait succeeds once the
//! expected set has arrived, in any order, or fails after a deadline with
//! a report of what is missing.
//!
//! ## Running
//!
//! The live tests are ignored by default:
//!
//! ```text
//! COMPOSEDB_URLS=http://localhost:7007,http://localhost:7008 \
//! COMPOSEDB_ADMIN_DID_SEEDS=<hex seed> \
//! cargo test -p docnet-suite -- --ignored
//! ```
//!
//! The same scenarios also run against the in-memory network of
//! `docnet-testkit` as part of the normal test run.
//!
//! ## Re-exports
//!
//! - `docnet_suite::core` - identifiers and identities
//! - `docnet_suite::watch` - the convergence watcher
//! - `docnet_suite::client` - node clients, feed and GraphQL helpers

pub mod config;
pub mod error;
pub mod models;
pub mod scenarios;

// Re-export component crates
pub use docnet_client as client;
pub use docnet_core as core;
pub use docnet_watch as watch;

pub use config::SuiteConfig;
pub use error::{Result, SuiteError};
pub use models::{basic_model_document_content, model_document_content, new_model, test_data_model};
pub use scenarios::{compose_record_lifecycle, create_and_read_across_nodes, feed_delivers_changes, setup_model};
