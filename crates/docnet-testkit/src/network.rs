//! In-memory fake network.
//!
//! A [`FakeNetwork`] simulates a set of nodes that replicate streams
//! asynchronously. Each [`FakeNode`] implements [`NodeClient`], so suite
//! scenarios run unchanged against it.
//!
//! ## Model
//!
//! - Every stream has one history (the ledger). Each node sees a prefix
//!   of it; a node's view only grows.
//! - A write lands on the writing node immediately and on its peers after
//!   `replication_delay`. Partitioned nodes neither send nor receive
//!   until healed.
//! - A node's change feed emits one event per commit it learns of, for
//!   documents of models it indexes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use docnet_client::commit::{genesis_payload, replace_payload, sign_payload, unique_nonce};
use docnet_client::{
    AggregationDocument, ClientError, Document, ModelDefinition, NodeClient, Result,
    StreamMetadata, StreamState, MODEL_META_MODEL,
};
use docnet_core::{codec, Cid, DidKey, GeneralJws, Identity, StreamId, StreamType};
use docnet_watch::memory::{self, MemoryFeed, MemorySource};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Configuration for a fake network.
#[derive(Debug, Clone, Default)]
pub struct FakeNetworkConfig {
    /// Delay before a write becomes visible on peer nodes.
    pub replication_delay: Duration,
}

impl FakeNetworkConfig {
    pub fn with_replication_delay(mut self, delay: Duration) -> Self {
        self.replication_delay = delay;
        self
    }
}

/// A simulated network of nodes.
#[derive(Clone)]
pub struct FakeNetwork {
    shared: Arc<Shared>,
}

struct Shared {
    config: FakeNetworkConfig,
    state: Mutex<NetworkState>,
}

struct NetworkState {
    ledger: HashMap<StreamId, StreamRecord>,
    nodes: Vec<NodeView>,
}

struct StreamRecord {
    model: Option<StreamId>,
    metadata: StreamMetadata,
    commits: Vec<(Cid, Value)>,
}

#[derive(Default)]
struct NodeView {
    known: HashMap<StreamId, usize>,
    indexed: Vec<StreamId>,
    feeds: Vec<MemoryFeed>,
    partitioned: bool,
}

impl NetworkState {
    fn view(&self, node: usize) -> Result<&NodeView> {
        self.nodes
            .get(node)
            .ok_or_else(|| ClientError::NotFound(format!("node {}", node)))
    }

    fn view_mut(&mut self, node: usize) -> Result<&mut NodeView> {
        self.nodes
            .get_mut(node)
            .ok_or_else(|| ClientError::NotFound(format!("node {}", node)))
    }

    fn known(&self, node: usize, id: &StreamId) -> usize {
        self.nodes
            .get(node)
            .and_then(|view| view.known.get(id).copied())
            .unwrap_or(0)
    }

    /// Grow `node`'s view of `id` to `count` commits, emitting feed events.
    fn advance(&mut self, node: usize, id: &StreamId, count: usize) {
        let NetworkState { ledger, nodes } = self;
        let (Some(record), Some(view)) = (ledger.get(id), nodes.get_mut(node)) else {
            return;
        };

        let known = view.known.entry(id.clone()).or_insert(0);
        let count = count.min(record.commits.len());
        if count <= *known {
            return;
        }
        let from = std::mem::replace(known, count);

        let indexed = record
            .model
            .as_ref()
            .map_or(false, |model| view.indexed.contains(model));
        if !indexed {
            return;
        }

        for (cid, content) in &record.commits[from..count] {
            let event = AggregationDocument {
                commit_id: id.at_commit(cid.clone()),
                content: Some(content.clone()),
                metadata: json!(record.metadata),
                event_type: None,
            };
            match serde_json::to_string(&event) {
                Ok(payload) => {
                    debug!(node, tip = %cid, "feed event");
                    view.feeds.retain(|feed| feed.send(payload.clone()));
                }
                Err(e) => warn!(node, "failed to encode feed event: {}", e),
            }
        }
    }

    /// Bring every reachable node up to the furthest reachable view.
    fn converge_reachable(&mut self) {
        let reachable: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| !self.nodes[i].partitioned)
            .collect();
        let targets: Vec<(StreamId, usize)> = self
            .ledger
            .keys()
            .map(|id| {
                let max = reachable.iter().map(|&i| self.known(i, id)).max().unwrap_or(0);
                (id.clone(), max)
            })
            .collect();

        for (id, count) in targets {
            for &node in &reachable {
                self.advance(node, &id, count);
            }
        }
    }
}

impl FakeNetwork {
    /// A network of `nodes` nodes with immediate replication.
    pub fn new(nodes: usize) -> Self {
        Self::with_config(nodes, FakeNetworkConfig::default())
    }

    pub fn with_config(nodes: usize, config: FakeNetworkConfig) -> Self {
        let state = NetworkState {
            ledger: HashMap::new(),
            nodes: (0..nodes).map(|_| NodeView::default()).collect(),
        };
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(state),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    /// A client for node `index`, authenticated as `identity` if given.
    pub fn connect(&self, index: usize, identity: Option<Identity>) -> Result<FakeNode> {
        self.lock().view(index)?;
        Ok(FakeNode {
            index,
            network: self.clone(),
            identity,
        })
    }

    /// Cut node `index` off from replication.
    pub fn partition(&self, index: usize) -> Result<()> {
        self.lock().view_mut(index)?.partitioned = true;
        debug!(node = index, "partitioned");
        Ok(())
    }

    /// Reconnect node `index` and catch up every reachable node.
    pub fn heal(&self, index: usize) -> Result<()> {
        let mut state = self.lock();
        state.view_mut(index)?.partitioned = false;
        state.converge_reachable();
        debug!(node = index, "healed");
        Ok(())
    }

    /// Push a raw payload to every feed of node `index`.
    pub fn inject(&self, index: usize, raw: &str) -> Result<()> {
        let mut state = self.lock();
        state.view_mut(index)?.feeds.retain(|feed| feed.send(raw));
        Ok(())
    }

    /// Break every feed of node `index` with a connection failure.
    pub fn fail_feeds(&self, index: usize, message: &str) -> Result<()> {
        let mut state = self.lock();
        state.view_mut(index)?.feeds.retain(|feed| feed.fail(message));
        Ok(())
    }

    /// Number of open feed subscriptions on node `index`.
    pub fn open_feeds(&self, index: usize) -> usize {
        self.lock()
            .nodes
            .get(index)
            .map_or(0, |view| view.feeds.iter().filter(|feed| !feed.is_closed()).count())
    }

    /// Record a new commit count for `id` written on `origin` and replicate it.
    fn replicate(&self, origin: usize, id: &StreamId, count: usize) {
        let peers: Vec<usize> = {
            let mut state = self.lock();
            state.advance(origin, id, count);
            if state.nodes.get(origin).map_or(true, |view| view.partitioned) {
                return;
            }
            (0..state.nodes.len()).filter(|&i| i != origin).collect()
        };

        let delay = self.shared.config.replication_delay;
        if delay.is_zero() {
            deliver(&mut self.lock(), &peers, id, count);
            return;
        }

        let network = self.clone();
        let id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            deliver(&mut network.lock(), &peers, &id, count);
        });
    }
}

fn deliver(state: &mut NetworkState, peers: &[usize], id: &StreamId, count: usize) {
    for &peer in peers {
        if state.nodes.get(peer).map_or(false, |view| !view.partitioned) {
            state.advance(peer, id, count);
        }
    }
}

impl std::fmt::Debug for FakeNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("FakeNetwork")
            .field("nodes", &state.nodes.len())
            .field("streams", &state.ledger.len())
            .finish()
    }
}

/// One node of a [`FakeNetwork`].
pub struct FakeNode {
    index: usize,
    network: FakeNetwork,
    identity: Option<Identity>,
}

impl FakeNode {
    /// Attach to a node index known to exist.
    pub(crate) fn attach(network: &FakeNetwork, index: usize, identity: Identity) -> Self {
        Self {
            index,
            network: network.clone(),
            identity: Some(identity),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn network(&self) -> &FakeNetwork {
        &self.network
    }

    fn identity(&self) -> Result<&Identity> {
        self.identity.as_ref().ok_or(ClientError::Unauthenticated)
    }

    /// Create a stream from a signed genesis payload.
    fn create_stream(
        &self,
        stream_type: StreamType,
        model: Option<StreamId>,
        payload: &Value,
        content: Value,
    ) -> Result<StreamId> {
        let identity = self.identity()?;
        let genesis = commit_cid(&sign_payload(identity, payload)?)?;
        let id = StreamId::new(stream_type, genesis.clone());

        {
            let mut state = self.network.lock();
            state.view(self.index)?;
            state.ledger.entry(id.clone()).or_insert_with(|| StreamRecord {
                metadata: StreamMetadata {
                    controllers: vec![identity.did().to_string()],
                    model: Some(
                        model
                            .as_ref()
                            .map_or_else(|| MODEL_META_MODEL.to_string(), StreamId::to_string),
                    ),
                },
                model,
                commits: vec![(genesis, content)],
            });
        }

        self.network.replicate(self.index, &id, 1);
        Ok(id)
    }

    fn require_model(&self, model: &StreamId) -> Result<()> {
        let state = self.network.lock();
        match state.ledger.get(model) {
            Some(_) if model.stream_type() == StreamType::Model => Ok(()),
            _ => Err(ClientError::NotFound(format!("model {}", model))),
        }
    }
}

impl std::fmt::Debug for FakeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeNode")
            .field("index", &self.index)
            .field("did", &self.did())
            .finish()
    }
}

/// CID of a signed commit.
fn commit_cid(jws: &GeneralJws) -> Result<Cid> {
    Ok(Cid::sha256(codec::DAG_JOSE, jws.to_compact()?.as_bytes()))
}

#[async_trait]
impl NodeClient for FakeNode {
    type Feed = MemorySource;

    fn did(&self) -> Option<&DidKey> {
        self.identity.as_ref().map(Identity::did)
    }

    async fn create_model(&self, definition: &ModelDefinition) -> Result<StreamId> {
        let did = self.identity()?.did();
        let content = serde_json::to_value(definition)?;
        let payload = genesis_payload(did, MODEL_META_MODEL, &content, None);
        self.create_stream(StreamType::Model, None, &payload, content)
    }

    async fn load_stream(&self, id: &StreamId) -> Result<StreamState> {
        let state = self.network.lock();
        state.view(self.index)?;

        let known = state.known(self.index, id);
        let record = state
            .ledger
            .get(id)
            .filter(|_| known > 0)
            .ok_or_else(|| ClientError::NotFound(format!("stream {}", id)))?;

        let commits = &record.commits[..known];
        Ok(StreamState {
            id: id.clone(),
            content: commits[known - 1].1.clone(),
            metadata: record.metadata.clone(),
            log: commits.iter().map(|(cid, _)| cid.clone()).collect(),
        })
    }

    async fn create_document(&self, model: &StreamId, content: Value) -> Result<Document> {
        let did = self.identity()?.did();
        self.require_model(model)?;

        let nonce = unique_nonce();
        let payload = genesis_payload(did, &model.to_string(), &content, Some(&nonce));
        let id = self.create_stream(
            StreamType::ModelInstanceDocument,
            Some(model.clone()),
            &payload,
            content.clone(),
        )?;

        Ok(Document {
            tip: id.genesis().clone(),
            id,
            model: model.clone(),
            content,
        })
    }

    async fn replace_document(&self, doc: &mut Document, content: Value) -> Result<()> {
        let identity = self.identity()?;
        let payload = replace_payload(doc.id.genesis(), &doc.tip, &content);
        let tip = commit_cid(&sign_payload(identity, &payload)?)?;

        let count = {
            let mut state = self.network.lock();
            let known = state.known(self.index, &doc.id);
            let record = state
                .ledger
                .get_mut(&doc.id)
                .filter(|_| known > 0)
                .ok_or_else(|| ClientError::NotFound(format!("stream {}", doc.id)))?;

            let current = record.commits.last().map(|(cid, _)| cid);
            if known != record.commits.len() || current != Some(&doc.tip) {
                return Err(ClientError::Rejected(format!(
                    "{} is not the tip of {}",
                    doc.tip, doc.id
                )));
            }
            record.commits.push((tip.clone(), content.clone()));
            record.commits.len()
        };

        self.network.replicate(self.index, &doc.id, count);
        doc.tip = tip;
        doc.content = content;
        Ok(())
    }

    async fn start_indexing_models(&self, models: &[StreamId]) -> Result<()> {
        self.identity()?;
        for model in models {
            self.require_model(model)?;
        }

        let mut state = self.network.lock();
        let view = state.view_mut(self.index)?;
        for model in models {
            if !view.indexed.contains(model) {
                view.indexed.push(model.clone());
            }
        }
        Ok(())
    }

    async fn stop_indexing_models(&self, models: &[StreamId]) -> Result<()> {
        self.identity()?;
        let mut state = self.network.lock();
        state
            .view_mut(self.index)?
            .indexed
            .retain(|model| !models.contains(model));
        Ok(())
    }

    async fn indexed_models(&self) -> Result<Vec<StreamId>> {
        self.identity()?;
        Ok(self.network.lock().view(self.index)?.indexed.clone())
    }

    async fn open_feed(&self) -> Result<MemorySource> {
        let (feed, source) = memory::channel();
        self.network.lock().view_mut(self.index)?.feeds.push(feed);
        Ok(source)
    }
}
