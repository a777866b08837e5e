//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use docnet_client::{ModelDefinition, NodeClient, Result};
use docnet_core::{Identity, Seed, StreamId};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::network::{FakeNetwork, FakeNetworkConfig, FakeNode};

/// Seed of the default admin identity.
pub const ADMIN_SEED: [u8; 32] = [
    192, 16, 89, 183, 66, 111, 35, 98, 211, 155, 35, 149, 177, 242, 119, 55, 202, 79, 94, 168,
    106, 74, 17, 10, 116, 105, 77, 116, 161, 176, 81, 189,
];

/// Install a fmt subscriber writing through the test harness.
///
/// Honors `RUST_LOG`, defaulting to `info`. Safe to call from every test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// The default admin identity.
pub fn admin_identity() -> Identity {
    Identity::from_seed(&Seed::from_bytes(ADMIN_SEED))
}

/// A deterministic identity distinct for each `n`.
pub fn identity(n: u8) -> Identity {
    let mut seed = [0u8; 32];
    seed[0] = n;
    seed[31] = 0x5a;
    Identity::from_seed(&Seed::from_bytes(seed))
}

/// A small list-relation model with one integer field.
pub fn test_model() -> ModelDefinition {
    ModelDefinition::new(
        "FixtureModel",
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "properties": { "myData": { "type": "integer" } },
            "additionalProperties": false
        }),
    )
}

/// Two connected nodes of a fake network.
pub struct TwoNodeFixture {
    pub network: FakeNetwork,
    pub node1: FakeNode,
    pub node2: FakeNode,
}

impl TwoNodeFixture {
    /// Two nodes with immediate replication and distinct identities.
    pub fn new() -> Self {
        Self::with_config(FakeNetworkConfig::default())
    }

    pub fn with_config(config: FakeNetworkConfig) -> Self {
        let network = FakeNetwork::with_config(2, config);
        Self {
            node1: FakeNode::attach(&network, 0, identity(1)),
            node2: FakeNode::attach(&network, 1, identity(2)),
            network,
        }
    }

    /// Create `definition` on node 1 and index it on both nodes.
    pub async fn indexed_model(&self, definition: &ModelDefinition) -> Result<StreamId> {
        let model = self.node1.create_model(definition).await?;
        self.node1.start_indexing_models(&[model.clone()]).await?;
        self.node2.start_indexing_models(&[model.clone()]).await?;
        Ok(model)
    }
}

impl Default for TwoNodeFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Identities for multi-party tests.
pub fn identities(count: u8) -> Vec<Identity> {
    (0..count).map(identity).collect()
}
