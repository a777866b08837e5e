//! Suite configuration.
//!
//! Read from the environment:
//!
//! | variable                    | meaning                                   | default |
//! |-----------------------------|-------------------------------------------|---------|
//! | `COMPOSEDB_URLS`            | comma-separated node URLs, at least two   | none    |
//! | `COMPOSEDB_ADMIN_DID_SEEDS` | comma-separated hex seeds, one per node   | none    |
//! | `NODE_SYNC_WAIT_SECS`       | pause before reading a write on a peer    | 2       |
//! | `CONVERGENCE_TIMEOUT_SECS`  | deadline for each convergence wait        | 10      |
//!
//! When only one seed is given, every node uses it.

use std::time::Duration;

use docnet_client::HttpNodeClient;
use docnet_core::{Identity, Seed};
use docnet_watch::WatchConfig;

use crate::error::{Result, SuiteError};

pub const ENV_URLS: &str = "COMPOSEDB_URLS";
pub const ENV_ADMIN_SEEDS: &str = "COMPOSEDB_ADMIN_DID_SEEDS";
pub const ENV_NODE_SYNC_WAIT: &str = "NODE_SYNC_WAIT_SECS";
pub const ENV_CONVERGENCE_TIMEOUT: &str = "CONVERGENCE_TIMEOUT_SECS";
/// GraphQL endpoint for the record lifecycle test. Read by that test only.
pub const ENV_GRAPHQL_URL: &str = "COMPOSEDB_GRAPHQL_URL";

const DEFAULT_NODE_SYNC_WAIT: Duration = Duration::from_secs(2);

/// Configuration for a suite run.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Node base URLs, in node order.
    pub node_urls: Vec<String>,
    /// Admin seeds, in node order.
    pub admin_seeds: Vec<Seed>,
    /// Fixed pause before reading a write from a peer node.
    pub node_sync_wait: Duration,
    /// Deadline for a freshly created model to become loadable.
    pub model_load_timeout: Duration,
    /// Wait behavior of feed watchers.
    pub watch: WatchConfig,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        let watch = WatchConfig::default();
        Self {
            node_urls: Vec::new(),
            admin_seeds: Vec::new(),
            node_sync_wait: DEFAULT_NODE_SYNC_WAIT,
            model_load_timeout: watch.max_wait,
            watch,
        }
    }
}

impl SuiteConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let node_urls = split_list(lookup(ENV_URLS).as_deref());
        if node_urls.len() < 2 {
            return Err(SuiteError::Config(format!(
                "{} must list at least two node URLs, got {}",
                ENV_URLS,
                node_urls.len()
            )));
        }

        let admin_seeds = split_list(lookup(ENV_ADMIN_SEEDS).as_deref())
            .iter()
            .map(|s| s.parse::<Seed>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if admin_seeds.is_empty() {
            return Err(SuiteError::Config(format!("{} must name at least one seed", ENV_ADMIN_SEEDS)));
        }

        let mut config = Self {
            node_urls,
            admin_seeds,
            ..Self::default()
        };
        if let Some(secs) = parse_secs(&lookup, ENV_NODE_SYNC_WAIT)? {
            config.node_sync_wait = secs;
        }
        if let Some(secs) = parse_secs(&lookup, ENV_CONVERGENCE_TIMEOUT)? {
            config.watch = config.watch.with_max_wait(secs);
            config.model_load_timeout = secs;
        }
        Ok(config)
    }

    /// Seed for node `index`; nodes without their own seed reuse the first.
    pub fn seed_for(&self, index: usize) -> Option<&Seed> {
        self.admin_seeds.get(index).or_else(|| self.admin_seeds.first())
    }

    /// Identity for node `index`.
    pub fn identity_for(&self, index: usize) -> Option<Identity> {
        self.seed_for(index).map(Identity::from_seed)
    }

    /// Authenticated HTTP clients for the first two nodes.
    pub fn http_clients(&self) -> Result<(HttpNodeClient, HttpNodeClient)> {
        let client = |index: usize| -> Result<HttpNodeClient> {
            let url = self
                .node_urls
                .get(index)
                .ok_or_else(|| SuiteError::Config(format!("no URL for node {}", index + 1)))?;
            let mut client = HttpNodeClient::new(url)?;
            if let Some(identity) = self.identity_for(index) {
                client = client.with_identity(identity);
            }
            Ok(client)
        };
        Ok((client(0)?, client(1)?))
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_secs<F>(lookup: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|e| SuiteError::Config(format!("{}: {}", key, e))),
    }
}
