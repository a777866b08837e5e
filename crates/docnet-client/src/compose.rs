//! GraphQL helpers for the `TestData` composite.
//!
//! Queries are fixed documents; every value travels in the request's
//! `variables`, so arbitrary text needs no escaping.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::error::{ClientError, Result};

/// Client for a ComposeDB GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct ComposeClient {
    endpoint: Url,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

impl ComposeClient {
    /// Client for the GraphQL endpoint at `endpoint`.
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            http: reqwest::Client::new(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Execute a query and return its `data`.
    ///
    /// Any reported GraphQL error fails the call with
    /// [`ClientError::Graphql`].
    pub async fn execute(&self, query: &str, variables: Option<Value>) -> Result<Value> {
        debug!(endpoint = %self.endpoint, "graphql request");
        let body = json!({ "query": query, "variables": variables.unwrap_or(Value::Null) });
        let response = self.http.post(self.endpoint.clone()).json(&body).send().await?;

        let status = response.status();
        let text = response.text().await?;
        let parsed: GraphqlResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(ClientError::Status {
                    status: status.as_u16(),
                    body: text,
                })
            }
            Err(e) => return Err(e.into()),
        };
        into_data(parsed)
    }

    /// Find the first record whose `textField` equals `text`.
    pub async fn query_record_by_text(&self, text: &str) -> Result<Option<TestRecord>> {
        let data = self
            .execute(QUERY_RECORD_BY_TEXT, Some(json!({ "text": text })))
            .await?;
        Ok(parse_index_records(&data)?.into_iter().next())
    }

    /// Create a record and return it.
    pub async fn create_record(&self, number: i64, text: &str, flag: bool) -> Result<TestRecord> {
        let data = self
            .execute(CREATE_RECORD, Some(create_record_variables(number, text, flag)))
            .await?;
        parse_mutation_document(&data, "createTestData")
    }

    /// Update a record and return its new field values.
    pub async fn update_record(&self, id: &str, number: i64, text: &str, flag: bool) -> Result<TestRecord> {
        let data = self
            .execute(UPDATE_RECORD, Some(update_record_variables(id, number, text, flag)))
            .await?;
        parse_mutation_document(&data, "updateTestData")
    }
}

fn into_data(response: GraphqlResponse) -> Result<Value> {
    if !response.errors.is_empty() {
        return Err(ClientError::Graphql(
            response.errors.into_iter().map(|e| e.message).collect(),
        ));
    }
    Ok(response.data.unwrap_or(Value::Null))
}

/// One `TestData` record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub numerical_field: i64,
    pub text_field: String,
    pub boolean_field: bool,
}

/// Query for the first record with `textField == $text`.
pub const QUERY_RECORD_BY_TEXT: &str = r#"query RecordByText($text: String!) {
  testDataIndex(first: 1, filters: { where: { textField: { equalTo: $text } } }) {
    edges {
      node {
        id
        numericalField
        textField
        booleanField
      }
    }
  }
}"#;

/// Mutation creating a record from `$input.content`.
pub const CREATE_RECORD: &str = r#"mutation CreateTestData($input: CreateTestDataInput!) {
  createTestData(input: $input) {
    document {
      id
      numericalField
      textField
      booleanField
    }
  }
}"#;

/// Mutation replacing the content of record `$input.id`.
pub const UPDATE_RECORD: &str = r#"mutation UpdateTestData($input: UpdateTestDataInput!) {
  updateTestData(input: $input) {
    document {
      numericalField
      textField
      booleanField
    }
  }
}"#;

fn record_content(number: i64, text: &str, flag: bool) -> Value {
    json!({
        "numericalField": number,
        "textField": text,
        "booleanField": flag,
    })
}

/// Variables for [`CREATE_RECORD`].
pub fn create_record_variables(number: i64, text: &str, flag: bool) -> Value {
    json!({ "input": { "content": record_content(number, text, flag) } })
}

/// Variables for [`UPDATE_RECORD`].
pub fn update_record_variables(id: &str, number: i64, text: &str, flag: bool) -> Value {
    json!({ "input": { "id": id, "content": record_content(number, text, flag) } })
}

/// Extract the records of a `testDataIndex` connection.
pub fn parse_index_records(data: &Value) -> Result<Vec<TestRecord>> {
    let edges = data
        .pointer("/testDataIndex/edges")
        .and_then(Value::as_array)
        .ok_or_else(|| ClientError::UnexpectedResponse("missing testDataIndex.edges".into()))?;

    edges
        .iter()
        .map(|edge| {
            let node = edge
                .get("node")
                .cloned()
                .ok_or_else(|| ClientError::UnexpectedResponse("edge without node".into()))?;
            Ok(serde_json::from_value(node)?)
        })
        .collect()
}

fn parse_mutation_document(data: &Value, mutation: &str) -> Result<TestRecord> {
    let document = data
        .get(mutation)
        .and_then(|m| m.get("document"))
        .cloned()
        .ok_or_else(|| ClientError::UnexpectedResponse(format!("missing {}.document", mutation)))?;
    Ok(serde_json::from_value(document)?)
}
