//! End-to-end scenarios.
//!
//! Each scenario takes two node clients and asserts one cross-node
//! property. They are generic over [`NodeClient`], so the same code runs
//! against live nodes and against an in-memory network.

use std::collections::HashSet;

use docnet_client::{decode_tip, ComposeClient, Document, NodeClient, TestRecord};
use docnet_core::StreamId;
use docnet_watch::{wait_for_condition, ConvergenceGroup, Watcher, DEFAULT_CONDITION_INTERVAL};
use tracing::info;

use crate::config::SuiteConfig;
use crate::error::{Result, SuiteError};
use crate::models::{basic_model_document_content, model_document_content, new_model};

/// Values of the three documents created by [`feed_delivers_changes`].
const CREATED: [i64; 3] = [40, 50, 60];

/// Replacements as (document index, new value).
const REPLACED: [(usize, i64); 3] = [(0, 41), (1, 51), (0, 42)];

/// Create the test model on node 1, wait until it loads and index it on
/// both nodes.
pub async fn setup_model<N: NodeClient>(node1: &N, node2: &N, config: &SuiteConfig) -> Result<StreamId> {
    let model = node1.create_model(&new_model()).await?;

    let model_ref = &model;
    let loaded = wait_for_condition(
        move || async move { node1.load_stream(model_ref).await.is_ok() },
        config.model_load_timeout,
        DEFAULT_CONDITION_INTERVAL,
    )
    .await;
    if !loaded {
        return Err(SuiteError::ModelUnavailable {
            model,
            waited: config.model_load_timeout,
        });
    }

    node1.start_indexing_models(&[model.clone()]).await?;
    info!(model = %model, "indexing model on node 1");
    node2.start_indexing_models(&[model.clone()]).await?;
    info!(model = %model, "indexing model on node 2");

    Ok(model)
}

/// Create a document on node 1 and read it back from node 2.
pub async fn create_and_read_across_nodes<N: NodeClient>(
    node1: &N,
    node2: &N,
    model: &StreamId,
    config: &SuiteConfig,
) -> Result<Document> {
    let created = node1
        .create_document(model, basic_model_document_content())
        .await?;

    tokio::time::sleep(config.node_sync_wait).await;

    let loaded = node2.load_document(&created.id).await?;
    if loaded.id != created.id {
        return Err(SuiteError::Assertion(format!(
            "node 2 returned {} for {}",
            loaded.id, created.id
        )));
    }
    info!(document = %created.id, "document visible on node 2");
    Ok(loaded)
}

/// Write three documents and three replacements on node 1 and wait until
/// both nodes' change feeds have announced every resulting tip.
///
/// Returns the expected tip set. Both feeds are closed on every path.
pub async fn feed_delivers_changes<N: NodeClient>(
    node1: &N,
    node2: &N,
    model: &StreamId,
    config: &SuiteConfig,
) -> Result<HashSet<String>> {
    let feed1 = node1.open_feed().await?;
    let feed2 = node2.open_feed().await?;

    let mut group = ConvergenceGroup::new()
        .with(Watcher::try_new("node1", feed1, decode_tip, config.watch.clone())?)
        .with(Watcher::try_new("node2", feed2, decode_tip, config.watch.clone())?);

    let result = write_and_wait(node1, model, &mut group).await;
    group.close().await;
    result
}

async fn write_and_wait<N: NodeClient>(
    node: &N,
    model: &StreamId,
    group: &mut ConvergenceGroup<String>,
) -> Result<HashSet<String>> {
    let mut expected = HashSet::new();
    let mut documents = Vec::with_capacity(CREATED.len());

    for value in CREATED {
        let doc = node
            .create_document(model, model_document_content(value))
            .await?;
        expected.insert(doc.tip.to_string());
        documents.push(doc);
    }

    for (index, value) in REPLACED {
        let doc = &mut documents[index];
        node.replace_document(doc, model_document_content(value))
            .await?;
        expected.insert(doc.tip.to_string());
    }

    group.wait_for_events(&expected).await?;
    info!(tips = expected.len(), "all tips delivered on both feeds");
    Ok(expected)
}

/// Create, find and update a `TestData` record through GraphQL.
pub async fn compose_record_lifecycle(compose: &ComposeClient, text: &str) -> Result<TestRecord> {
    let created = compose.create_record(10, text, true).await?;
    let id = created
        .id
        .clone()
        .ok_or_else(|| SuiteError::Assertion("created record has no id".into()))?;

    let found = compose
        .query_record_by_text(text)
        .await?
        .ok_or_else(|| SuiteError::Assertion(format!("no record with text {:?}", text)))?;
    if found.id.as_deref() != Some(id.as_str()) {
        return Err(SuiteError::Assertion(format!(
            "query returned {:?}, expected {}",
            found.id, id
        )));
    }

    let updated_text = format!("{} (updated)", text);
    let updated = compose.update_record(&id, 20, &updated_text, false).await?;
    if updated.numerical_field != 20 || updated.text_field != updated_text || updated.boolean_field {
        return Err(SuiteError::Assertion(format!("update not applied: {:?}", updated)));
    }
    info!(record = %id, "record lifecycle complete");
    Ok(updated)
}
