//! Commit payloads.
//!
//! Streams are built from signed commits. A genesis commit names the
//! controller and model; every later commit patches the content and links
//! to the previous tip. Payloads are JSON and are signed as a general JWS.

use docnet_core::{Cid, DidKey, GeneralJws, Identity, StreamType};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::Result;

/// Separator key under which the model reference is stored.
const MODEL_SEP: &str = "model";

/// Anchoring and publishing options sent with every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteOpts {
    pub anchor: bool,
    pub publish: bool,
}

impl Default for WriteOpts {
    fn default() -> Self {
        Self {
            anchor: true,
            publish: true,
        }
    }
}

/// Body of a stream creation request.
#[derive(Debug, Clone, Serialize)]
pub struct CreateStreamRequest {
    #[serde(rename = "type")]
    pub stream_type: u64,
    pub genesis: GeneralJws,
    pub opts: WriteOpts,
}

impl CreateStreamRequest {
    pub fn new(stream_type: StreamType, genesis: GeneralJws) -> Self {
        Self {
            stream_type: stream_type.code(),
            genesis,
            opts: WriteOpts::default(),
        }
    }
}

/// Body of a commit request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCommitRequest {
    pub stream_id: String,
    pub commit: GeneralJws,
    pub opts: WriteOpts,
}

/// Genesis payload for a stream controlled by `controller`.
///
/// `unique` distinguishes otherwise identical genesis commits, so that two
/// documents with the same content get different stream ids.
pub fn genesis_payload(controller: &DidKey, model: &str, content: &Value, unique: Option<&str>) -> Value {
    let mut header = json!({
        "controllers": [controller.as_str()],
        "model": model,
        "sep": MODEL_SEP,
    });
    if let Some(unique) = unique {
        header["unique"] = Value::String(unique.to_string());
    }
    json!({ "header": header, "data": content })
}

/// Payload replacing the whole content of a stream.
pub fn replace_payload(genesis: &Cid, prev: &Cid, content: &Value) -> Value {
    json!({
        "header": {},
        "data": [{ "op": "replace", "path": "", "value": content }],
        "prev": prev.to_string(),
        "id": genesis.to_string(),
    })
}

/// Sign a payload as a general JWS.
pub fn sign_payload(identity: &Identity, payload: &Value) -> Result<GeneralJws> {
    Ok(identity.sign_general(&serde_json::to_vec(payload)?)?)
}

/// Random value for the `unique` genesis header field.
pub fn unique_nonce() -> String {
    let bytes: [u8; 12] = rand::random();
    base64::encode(bytes)
}
