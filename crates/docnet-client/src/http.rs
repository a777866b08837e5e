//! HTTP node client.

use async_trait::async_trait;
use docnet_core::{Cid, DidKey, Identity, StreamId, StreamType};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use crate::commit::{
    genesis_payload, replace_payload, sign_payload, unique_nonce, ApplyCommitRequest,
    CreateStreamRequest, WriteOpts,
};
use crate::error::{ClientError, Result};
use crate::feed::{SseSource, FEED_PATH};
use crate::node::{Document, ModelDefinition, NodeClient, StreamMetadata, StreamState, MODEL_META_MODEL};

const STREAMS_PATH: &str = "api/v0/streams";
const COMMITS_PATH: &str = "api/v0/commits";
const ADMIN_CODE_PATH: &str = "api/v0/admin/getCode";
const ADMIN_MODELS_PATH: &str = "api/v0/admin/models";
const ADMIN_MODEL_DATA_PATH: &str = "api/v0/admin/modelData";

/// Client for one node's HTTP API.
pub struct HttpNodeClient {
    base: Url,
    http: reqwest::Client,
    identity: Option<Identity>,
}

impl HttpNodeClient {
    /// Client for the node at `url`, without an identity.
    pub fn new(url: &str) -> Result<Self> {
        let mut base = Url::parse(url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            base,
            http: reqwest::Client::new(),
            identity: None,
        })
    }

    /// Authenticate writes and admin calls with `identity`.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Use a preconfigured reqwest client.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    fn identity(&self) -> Result<&Identity> {
        self.identity.as_ref().ok_or(ClientError::Unauthenticated)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(method = %method, path = url.path(), "node request");
        self.http.request(method, url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        Ok(self.send(request).await?.json().await?)
    }

    /// Fetch a one-shot admin code.
    async fn admin_code(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct CodeResponse {
            code: String,
        }

        let url = self.endpoint(ADMIN_CODE_PATH)?;
        let response: CodeResponse = self.send_json(self.request(Method::GET, url)).await?;
        Ok(response.code)
    }

    /// Send an admin request, authorized by a JWS over the code, path and body.
    async fn admin_request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Response> {
        let identity = self.identity()?;
        let code = self.admin_code().await?;
        let url = self.endpoint(path)?;

        let mut claims = json!({ "code": code, "requestPath": url.path() });
        if let Some(body) = &body {
            claims["requestBody"] = body.clone();
        }
        let jws = identity.sign_json(&claims)?;

        let mut request = self
            .request(method, url)
            .header(AUTHORIZATION, format!("Basic {}", jws));
        if let Some(body) = body {
            request = request.json(&body);
        }
        self.send(request).await
    }

    async fn create_stream(&self, stream_type: StreamType, payload: &Value) -> Result<StreamState> {
        let genesis = sign_payload(self.identity()?, payload)?;
        let url = self.endpoint(STREAMS_PATH)?;
        let body = CreateStreamRequest::new(stream_type, genesis);

        let response: StreamResponse = self
            .send_json(self.request(Method::POST, url).json(&body))
            .await?;
        Ok(response.into())
    }
}

impl std::fmt::Debug for HttpNodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpNodeClient")
            .field("base", &self.base.as_str())
            .field("did", &self.identity.as_ref().map(Identity::did))
            .finish()
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    type Feed = SseSource;

    fn did(&self) -> Option<&DidKey> {
        self.identity.as_ref().map(Identity::did)
    }

    async fn create_model(&self, definition: &ModelDefinition) -> Result<StreamId> {
        let did = self.identity()?.did();
        let content = serde_json::to_value(definition)?;
        let payload = genesis_payload(did, MODEL_META_MODEL, &content, None);

        let state = self.create_stream(StreamType::Model, &payload).await?;
        info!(model = %state.id, name = %definition.name, "created model");
        Ok(state.id)
    }

    async fn load_stream(&self, id: &StreamId) -> Result<StreamState> {
        let url = self.endpoint(&format!("{}/{}", STREAMS_PATH, id))?;
        let response: StreamResponse = self.send_json(self.request(Method::GET, url)).await?;
        Ok(response.into())
    }

    async fn create_document(&self, model: &StreamId, content: Value) -> Result<Document> {
        let did = self.identity()?.did();
        let nonce = unique_nonce();
        let payload = genesis_payload(did, &model.to_string(), &content, Some(&nonce));

        let state = self
            .create_stream(StreamType::ModelInstanceDocument, &payload)
            .await?;
        Document::from_state(state)
    }

    async fn replace_document(&self, doc: &mut Document, content: Value) -> Result<()> {
        let payload = replace_payload(doc.id.genesis(), &doc.tip, &content);
        let commit = sign_payload(self.identity()?, &payload)?;
        let url = self.endpoint(COMMITS_PATH)?;
        let body = ApplyCommitRequest {
            stream_id: doc.id.to_string(),
            commit,
            opts: WriteOpts::default(),
        };

        let response: StreamResponse = self
            .send_json(self.request(Method::POST, url).json(&body))
            .await?;
        let state = StreamState::from(response);
        doc.tip = state
            .tip()
            .cloned()
            .ok_or_else(|| ClientError::UnexpectedResponse(format!("{} has an empty log", doc.id)))?;
        doc.content = state.content;
        Ok(())
    }

    async fn start_indexing_models(&self, models: &[StreamId]) -> Result<()> {
        let body = ModelDataRequest::new(models);
        self.admin_request(Method::POST, ADMIN_MODEL_DATA_PATH, Some(serde_json::to_value(body)?))
            .await?;
        info!(count = models.len(), "started indexing models");
        Ok(())
    }

    async fn stop_indexing_models(&self, models: &[StreamId]) -> Result<()> {
        let body = json!({ "models": models });
        self.admin_request(Method::DELETE, ADMIN_MODELS_PATH, Some(body))
            .await?;
        info!(count = models.len(), "stopped indexing models");
        Ok(())
    }

    async fn indexed_models(&self) -> Result<Vec<StreamId>> {
        let response = self
            .admin_request(Method::GET, ADMIN_MODEL_DATA_PATH, None)
            .await?;
        let data: ModelDataResponse = response.json().await?;
        Ok(data.model_data.into_iter().map(|entry| entry.stream_id).collect())
    }

    async fn open_feed(&self) -> Result<SseSource> {
        SseSource::connect(&self.http, self.endpoint(FEED_PATH)?).await
    }
}

/// Stream state as returned by the streams and commits endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamResponse {
    stream_id: StreamId,
    state: WireState,
}

#[derive(Debug, Deserialize)]
struct WireState {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    metadata: StreamMetadata,
    #[serde(default)]
    log: Vec<LogEntry>,
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    cid: Cid,
}

impl From<StreamResponse> for StreamState {
    fn from(response: StreamResponse) -> Self {
        StreamState {
            id: response.stream_id,
            content: response.state.content,
            metadata: response.state.metadata,
            log: response.state.log.into_iter().map(|entry| entry.cid).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ModelDataEntry {
    #[serde(rename = "streamID")]
    stream_id: StreamId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelDataRequest {
    model_data: Vec<ModelDataEntry>,
}

impl ModelDataRequest {
    fn new(models: &[StreamId]) -> Self {
        Self {
            model_data: models
                .iter()
                .map(|id| ModelDataEntry { stream_id: id.clone() })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelDataResponse {
    #[serde(default)]
    model_data: Vec<ModelDataEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use docnet_core::{codec, verify_jws, Seed};
    use docnet_watch::EventSource;
    use mockito::Matcher;

    fn admin() -> Identity {
        Identity::from_seed(&Seed::from_bytes([7; 32]))
    }

    fn model_id() -> StreamId {
        StreamId::new(StreamType::Model, Cid::sha256(codec::DAG_CBOR, b"m"))
    }

    fn stream_body(id: &StreamId, model: &StreamId, log: &[&Cid], content: Value) -> String {
        json!({
            "streamId": id.to_string(),
            "state": {
                "content": content,
                "metadata": { "controllers": [admin().did().as_str()], "model": model.to_string() },
                "log": log.iter().map(|cid| json!({ "cid": cid.to_string() })).collect::<Vec<_>>(),
            }
        })
        .to_string()
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = HttpNodeClient::new("http://localhost:7007").unwrap();
        assert_eq!(client.endpoint(STREAMS_PATH).unwrap().as_str(), "http://localhost:7007/api/v0/streams");

        let client = HttpNodeClient::new("http://gateway/node1").unwrap();
        assert_eq!(
            client.endpoint(FEED_PATH).unwrap().as_str(),
            "http://gateway/node1/api/v0/feed/aggregation/documents"
        );
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(HttpNodeClient::new("not a url"), Err(ClientError::Url(_))));
    }

    #[tokio::test]
    async fn test_writes_require_identity() {
        let client = HttpNodeClient::new("http://localhost:7007").unwrap();
        assert!(client.did().is_none());

        let model = StreamId::new(StreamType::Model, Cid::sha256(codec::DAG_CBOR, b"m"));
        let err = client
            .create_document(&model, json!({ "myData": 1 }))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Unauthenticated));

        let err = client.start_indexing_models(&[model]).await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthenticated));
    }

    #[test]
    fn test_stream_response_parsing() {
        let genesis = Cid::sha256(codec::DAG_JOSE, b"g");
        let tip = Cid::sha256(codec::DAG_JOSE, b"t");
        let id = StreamId::new(StreamType::ModelInstanceDocument, genesis.clone());

        let raw = json!({
            "streamId": id.to_string(),
            "docId": id.to_string(),
            "state": {
                "type": 3,
                "content": { "myData": 40 },
                "metadata": { "controllers": ["did:key:z6Mk"], "model": "kmodel" },
                "anchorStatus": "PENDING",
                "log": [
                    { "cid": genesis.to_string(), "type": 0 },
                    { "cid": tip.to_string(), "type": 1 }
                ]
            }
        });

        let state: StreamState = serde_json::from_value::<StreamResponse>(raw).unwrap().into();
        assert_eq!(state.id, id);
        assert_eq!(state.tip(), Some(&tip));
        assert_eq!(state.metadata.model.as_deref(), Some("kmodel"));
    }

    #[test]
    fn test_model_data_wire_form() {
        let model = StreamId::new(StreamType::Model, Cid::sha256(codec::DAG_CBOR, b"m"));
        let body = serde_json::to_value(ModelDataRequest::new(&[model.clone()])).unwrap();
        assert_eq!(body, json!({ "modelData": [{ "streamID": model.to_string() }] }));

        let response: ModelDataResponse =
            serde_json::from_value(json!({ "modelData": [{ "streamID": model.to_string(), "indices": [] }] }))
                .unwrap();
        assert_eq!(response.model_data[0].stream_id, model);
    }

    #[tokio::test]
    async fn test_admin_request_signs_code_path_and_body() {
        let mut server = mockito::Server::new_async().await;
        let client = HttpNodeClient::new(&server.url()).unwrap().with_identity(admin());
        let model = model_id();

        let body = json!({ "modelData": [{ "streamID": model.to_string() }] });
        let jws = admin()
            .sign_json(&json!({
                "code": "c0de",
                "requestPath": "/api/v0/admin/modelData",
                "requestBody": body,
            }))
            .unwrap();

        let code = server
            .mock("GET", "/api/v0/admin/getCode")
            .with_status(200)
            .with_body(r#"{"code":"c0de"}"#)
            .expect(1)
            .create_async()
            .await;
        let index = server
            .mock("POST", "/api/v0/admin/modelData")
            .match_header("authorization", Matcher::Exact(format!("Basic {}", jws)))
            .match_body(Matcher::Json(body.clone()))
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        client.start_indexing_models(&[model]).await.unwrap();
        code.assert_async().await;
        index.assert_async().await;

        // The header the node accepted carries the code, path and body.
        let (signer, payload) = verify_jws(&jws).unwrap();
        assert_eq!(&signer, admin().did());
        let claims: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(claims["code"], "c0de");
        assert_eq!(claims["requestPath"], "/api/v0/admin/modelData");
        assert_eq!(claims["requestBody"], body);
    }

    #[tokio::test]
    async fn test_indexed_models_without_body_claim() {
        let mut server = mockito::Server::new_async().await;
        let client = HttpNodeClient::new(&server.url()).unwrap().with_identity(admin());
        let model = model_id();

        let jws = admin()
            .sign_json(&json!({ "code": "c1", "requestPath": "/api/v0/admin/modelData" }))
            .unwrap();
        server
            .mock("GET", "/api/v0/admin/getCode")
            .with_body(r#"{"code":"c1"}"#)
            .create_async()
            .await;
        let list = server
            .mock("GET", "/api/v0/admin/modelData")
            .match_header("authorization", Matcher::Exact(format!("Basic {}", jws)))
            .with_body(json!({ "modelData": [{ "streamID": model.to_string() }] }).to_string())
            .create_async()
            .await;

        assert_eq!(client.indexed_models().await.unwrap(), vec![model]);
        list.assert_async().await;
    }

    #[tokio::test]
    async fn test_admin_code_failure_stops_request() {
        let mut server = mockito::Server::new_async().await;
        let client = HttpNodeClient::new(&server.url()).unwrap().with_identity(admin());

        server
            .mock("GET", "/api/v0/admin/getCode")
            .with_status(401)
            .with_body("admin DID not allowed")
            .create_async()
            .await;
        let stop = server
            .mock("DELETE", "/api/v0/admin/models")
            .expect(0)
            .create_async()
            .await;

        let err = client.stop_indexing_models(&[model_id()]).await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 401, ref body } if body == "admin DID not allowed"));
        stop.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_maps_to_status_error() {
        let mut server = mockito::Server::new_async().await;
        let client = HttpNodeClient::new(&server.url()).unwrap();
        let id = StreamId::new(StreamType::ModelInstanceDocument, Cid::sha256(codec::DAG_JOSE, b"d"));

        server
            .mock("GET", format!("/api/v0/streams/{}", id).as_str())
            .with_status(404)
            .with_body("stream not found")
            .create_async()
            .await;

        let err = client.load_stream(&id).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, ClientError::Status { status: 404, ref body } if body == "stream not found"));
    }

    #[tokio::test]
    async fn test_create_and_replace_document() {
        let mut server = mockito::Server::new_async().await;
        let client = HttpNodeClient::new(&server.url()).unwrap().with_identity(admin());
        let model = model_id();
        let genesis = Cid::sha256(codec::DAG_JOSE, b"genesis");
        let next = Cid::sha256(codec::DAG_JOSE, b"next");
        let id = StreamId::new(StreamType::ModelInstanceDocument, genesis.clone());

        let create = server
            .mock("POST", "/api/v0/streams")
            .match_body(Matcher::PartialJson(json!({
                "type": 3,
                "opts": { "anchor": true, "publish": true }
            })))
            .with_body(stream_body(&id, &model, &[&genesis], json!({ "myData": 1 })))
            .create_async()
            .await;
        let commit = server
            .mock("POST", "/api/v0/commits")
            .match_body(Matcher::PartialJson(json!({ "streamId": id.to_string() })))
            .with_body(stream_body(&id, &model, &[&genesis, &next], json!({ "myData": 2 })))
            .create_async()
            .await;

        let mut doc = client.create_document(&model, json!({ "myData": 1 })).await.unwrap();
        assert_eq!(doc.id, id);
        assert_eq!(doc.model, model);
        assert_eq!(doc.tip, genesis);

        client.replace_document(&mut doc, json!({ "myData": 2 })).await.unwrap();
        assert_eq!(doc.tip, next);
        assert_eq!(doc.content, json!({ "myData": 2 }));

        create.assert_async().await;
        commit.assert_async().await;
    }

    #[tokio::test]
    async fn test_open_feed_reads_events() {
        let mut server = mockito::Server::new_async().await;
        let client = HttpNodeClient::new(&server.url()).unwrap();
        let feed = server
            .mock("GET", "/api/v0/feed/aggregation/documents")
            .match_header("accept", "text/event-stream")
            .with_header("content-type", "text/event-stream")
            .with_body(": hi\ndata: {}\n\n")
            .create_async()
            .await;

        let mut source = client.open_feed().await.unwrap();
        assert_eq!(source.next_message().await.unwrap(), Some("{}".into()));
        source.close().await;
        feed.assert_async().await;
    }
}
