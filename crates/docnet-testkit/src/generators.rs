//! Proptest generators for property-based testing.

use std::collections::HashSet;

use docnet_core::{codec, Cid, CommitId, StreamId, StreamType};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Generate a commit CID.
pub fn cid() -> impl Strategy<Value = Cid> {
    prop::collection::vec(any::<u8>(), 0..64).prop_map(|bytes| Cid::sha256(codec::DAG_JOSE, &bytes))
}

/// Generate a document stream id.
pub fn document_id() -> impl Strategy<Value = StreamId> {
    cid().prop_map(|genesis| StreamId::new(StreamType::ModelInstanceDocument, genesis))
}

/// Generate a document pinned at some commit.
pub fn commit_id() -> impl Strategy<Value = CommitId> {
    (document_id(), cid()).prop_map(|(id, commit)| id.at_commit(commit))
}

/// Generate document content for the single-field test model.
pub fn document_content() -> impl Strategy<Value = Value> {
    any::<i64>().prop_map(|n| json!({ "myData": n }))
}

/// Generate an expected tip set together with a delivery schedule for it.
///
/// The schedule contains every tip at least once, in arbitrary order, with
/// up to `tips.len()` extra duplicates.
pub fn tips_with_delivery(max: usize) -> impl Strategy<Value = (HashSet<String>, Vec<String>)> {
    prop::collection::hash_set(cid().prop_map(|c| c.to_string()), 1..=max.max(1)).prop_flat_map(|tips| {
        let base: Vec<String> = tips.iter().cloned().collect();
        let n = base.len();
        prop::collection::vec(0..n, 0..=n).prop_flat_map(move |extra| {
            let mut schedule = base.clone();
            schedule.extend(extra.iter().map(|&i| base[i].clone()));
            (Just(tips.clone()), Just(schedule).prop_shuffle())
        })
    })
}

/// Render a feed payload announcing `commit`.
pub fn feed_payload(commit: &CommitId, content: &Value) -> String {
    json!({
        "commitId": commit.to_string(),
        "content": content,
        "metadata": { "controllers": [], "model": null },
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docnet_client::decode_tip;

    proptest! {
        #[test]
        fn schedule_covers_every_tip((tips, schedule) in tips_with_delivery(12)) {
            let delivered: HashSet<String> = schedule.iter().cloned().collect();
            prop_assert_eq!(&delivered, &tips);
            prop_assert!(schedule.len() >= tips.len());
            prop_assert!(schedule.len() <= tips.len() * 2);
        }

        #[test]
        fn feed_payload_announces_commit(commit in commit_id(), content in document_content()) {
            let tip = decode_tip(&feed_payload(&commit, &content)).unwrap();
            prop_assert_eq!(tip, commit.commit().to_string());
        }
    }
}
