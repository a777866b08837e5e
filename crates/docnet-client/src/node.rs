//! The node client contract.
//!
//! A [`NodeClient`] is one connection to one node of the network. The
//! suite holds one client per node and never assumes that a write made
//! through one client is immediately visible through another.

use async_trait::async_trait;
use docnet_core::{Cid, CommitId, DidKey, StreamId, StreamType};
use docnet_watch::EventSource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, Result};

/// Stream id of the meta-model that every model stream instantiates.
pub const MODEL_META_MODEL: &str = "kh4q0ozorrgaq2mezktnrmdwleo1d";

/// How documents of a model relate to their controlling account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AccountRelation {
    /// Any number of documents per account.
    List,
    /// At most one document per account.
    Single,
}

/// Content of a model stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefinition {
    pub version: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub account_relation: AccountRelation,
    pub schema: Value,
}

impl ModelDefinition {
    /// A list-relation model with the given JSON schema.
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            version: "1.0".into(),
            name: name.into(),
            description: None,
            account_relation: AccountRelation::List,
            schema,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_account_relation(mut self, relation: AccountRelation) -> Self {
        self.account_relation = relation;
        self
    }
}

/// Stream metadata as reported by a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(default)]
    pub controllers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// The state of a stream as seen by one node.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamState {
    pub id: StreamId,
    pub content: Value,
    pub metadata: StreamMetadata,
    /// Commit CIDs, genesis first.
    pub log: Vec<Cid>,
}

impl StreamState {
    pub fn stream_type(&self) -> StreamType {
        self.id.stream_type()
    }

    /// The latest commit, if the log is non-empty.
    pub fn tip(&self) -> Option<&Cid> {
        self.log.last()
    }
}

/// A model instance document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: StreamId,
    pub model: StreamId,
    pub content: Value,
    /// CID of the latest commit.
    pub tip: Cid,
}

impl Document {
    /// Build a document view from a loaded stream.
    pub fn from_state(state: StreamState) -> Result<Self> {
        if state.stream_type() != StreamType::ModelInstanceDocument {
            return Err(ClientError::UnexpectedResponse(format!(
                "{} is a {:?} stream, not a document",
                state.id,
                state.stream_type()
            )));
        }
        let tip = state
            .tip()
            .cloned()
            .ok_or_else(|| ClientError::UnexpectedResponse(format!("{} has an empty log", state.id)))?;
        let model = state
            .metadata
            .model
            .as_deref()
            .ok_or_else(|| ClientError::UnexpectedResponse(format!("{} has no model", state.id)))?
            .parse::<StreamId>()?;

        Ok(Self {
            id: state.id,
            model,
            content: state.content,
            tip,
        })
    }

    /// The document pinned at its current tip.
    pub fn commit_id(&self) -> CommitId {
        self.id.at_commit(self.tip.clone())
    }
}

/// Operations the suite needs from a node.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Change feed subscription type.
    type Feed: EventSource;

    /// The identity writes are authenticated with, if any.
    fn did(&self) -> Option<&DidKey>;

    /// Create a model stream and return its id.
    async fn create_model(&self, definition: &ModelDefinition) -> Result<StreamId>;

    /// Load any stream.
    async fn load_stream(&self, id: &StreamId) -> Result<StreamState>;

    /// Create a document of `model` with `content`.
    async fn create_document(&self, model: &StreamId, content: Value) -> Result<Document>;

    /// Replace a document's content, updating `doc` in place.
    async fn replace_document(&self, doc: &mut Document, content: Value) -> Result<()>;

    /// Load a document.
    async fn load_document(&self, id: &StreamId) -> Result<Document> {
        Document::from_state(self.load_stream(id).await?)
    }

    /// Start indexing the given models.
    async fn start_indexing_models(&self, models: &[StreamId]) -> Result<()>;

    /// Stop indexing the given models.
    async fn stop_indexing_models(&self, models: &[StreamId]) -> Result<()>;

    /// Models currently indexed by the node.
    async fn indexed_models(&self) -> Result<Vec<StreamId>>;

    /// Subscribe to the node's document change feed.
    async fn open_feed(&self) -> Result<Self::Feed>;
}
