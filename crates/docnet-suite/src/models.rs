//! Model definitions and document content used by the scenarios.

use docnet_client::ModelDefinition;
use serde_json::{json, Value};

/// The single-field model created at the start of a run.
pub fn new_model() -> ModelDefinition {
    ModelDefinition::new(
        "MyModel",
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "properties": {
                "myData": { "type": "integer", "minimum": 0, "maximum": 10000 }
            },
            "required": ["myData"],
            "additionalProperties": false
        }),
    )
    .with_description("Model for convergence tests")
}

/// Content of a document of [`new_model`].
pub fn model_document_content(value: i64) -> Value {
    json!({ "myData": value })
}

/// Content used when a document's value does not matter.
pub fn basic_model_document_content() -> Value {
    model_document_content(2)
}

/// The `TestData` model behind the GraphQL helpers.
pub fn test_data_model() -> ModelDefinition {
    ModelDefinition::new(
        "TestData",
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "properties": {
                "numericalField": { "type": "integer" },
                "textField": { "type": "string", "maxLength": 1024 },
                "booleanField": { "type": "boolean" }
            },
            "required": ["numericalField", "textField", "booleanField"],
            "additionalProperties": false
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_content_matches_schema_field() {
        let model = new_model();
        let content = basic_model_document_content();

        let field = content.as_object().unwrap().keys().next().unwrap();
        assert!(model.schema["properties"].get(field).is_some());
        assert_eq!(model.schema["required"][0], "myData");
    }

    #[test]
    fn test_data_model_fields() {
        let props = test_data_model().schema["properties"].clone();
        for field in ["numericalField", "textField", "booleanField"] {
            assert!(props.get(field).is_some(), "missing {}", field);
        }
    }
}
