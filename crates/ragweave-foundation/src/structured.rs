//! Structured output extraction
//!
//! Requests a reply in the JSON-schema response format, validates it
//! against the same schema, then deserializes it.

use jsonschema::JSONSchema;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{ChatMessage, ChatModel, ChatRequest, ResponseFormat};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

/// JSON schema of a flat object.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonObjectSchema {
    name: String,
    description: Option<String>,
    properties: Vec<(String, Value)>,
    required: Option<Vec<String>>,
}

impl JsonObjectSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            properties: Vec::new(),
            required: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn property(mut self, name: impl Into<String>, kind: &str, description: Option<&str>) -> Self {
        let mut schema = json!({ "type": kind });
        if let Some(description) = description {
            schema["description"] = Value::String(description.to_string());
        }
        self.properties.push((name.into(), schema));
        self
    }

    #[must_use]
    pub fn string(self, name: impl Into<String>) -> Self {
        self.property(name, "string", None)
    }

    #[must_use]
    pub fn integer(self, name: impl Into<String>) -> Self {
        self.property(name, "integer", None)
    }

    #[must_use]
    pub fn number(self, name: impl Into<String>) -> Self {
        self.property(name, "number", None)
    }

    #[must_use]
    pub fn boolean(self, name: impl Into<String>) -> Self {
        self.property(name, "boolean", None)
    }

    #[must_use]
    pub fn described(self, name: impl Into<String>, kind: &str, description: &str) -> Self {
        self.property(name, kind, Some(description))
    }

    /// Without an explicit list every property is required, which is what
    /// strict schema mode expects.
    #[must_use]
    pub fn required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self.properties.iter().cloned().collect();
        let required: Vec<String> = match &self.required {
            Some(required) => required.clone(),
            None => self.properties.iter().map(|(name, _)| name.clone()).collect(),
        };
        let mut schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        });
        if let Some(description) = &self.description {
            schema["description"] = Value::String(description.clone());
        }
        schema
    }

    /// Checks `value` against the schema, listing every violation.
    pub fn validate(&self, value: &Value) -> RagResult<()> {
        let schema = self.to_json();
        let compiled = JSONSchema::compile(&schema)
            .map_err(|e| RagError::Configuration(format!("invalid schema {}: {e}", self.name)))?;
        let violations: Vec<String> = match compiled.validate(value) {
            Ok(()) => return Ok(()),
            Err(errors) => errors.map(|e| e.to_string()).collect(),
        };
        Err(RagError::Generation(format!(
            "reply does not match schema {}: {}",
            self.name,
            violations.join("; ")
        )))
    }
}

pub struct StructuredOutputExtractor {
    chat_model: Arc<dyn ChatModel>,
}

impl StructuredOutputExtractor {
    pub fn new(chat_model: Arc<dyn ChatModel>) -> Self {
        Self { chat_model }
    }

    /// Returns the validated JSON reply.
    pub async fn extract_value(&self, prompt: &str, schema: &JsonObjectSchema) -> RagResult<Value> {
        let request = ChatRequest::new(vec![ChatMessage::user(prompt)]).with_response_format(
            ResponseFormat::JsonSchema {
                name: schema.name().to_string(),
                schema: schema.to_json(),
            },
        );
        let response = self.chat_model.chat(request).await?;
        debug!(schema = %schema.name(), reply = %response.text, "structured reply");

        let value: Value = serde_json::from_str(strip_json_fences(&response.text))
            .map_err(|e| RagError::Generation(format!("reply is not JSON: {e}")))?;
        schema.validate(&value)?;
        Ok(value)
    }

    pub async fn extract<T: DeserializeOwned>(
        &self,
        prompt: &str,
        schema: &JsonObjectSchema,
    ) -> RagResult<T> {
        let value = self.extract_value(prompt, schema).await?;
        serde_json::from_value(value).map_err(|e| RagError::Serialization(e.to_string()))
    }
}

/// Some compatible servers wrap JSON replies in a markdown fence.
fn strip_json_fences(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragweave_kernel::rag::ChatResponse;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: i64,
        height: f64,
        married: bool,
    }

    fn person_schema() -> JsonObjectSchema {
        JsonObjectSchema::new("Person")
            .string("name")
            .integer("age")
            .number("height")
            .boolean("married")
    }

    struct Json(&'static str);

    #[async_trait]
    impl ChatModel for Json {
        fn model_name(&self) -> &str {
            "json"
        }

        async fn chat(&self, request: ChatRequest) -> RagResult<ChatResponse> {
            assert!(matches!(
                request.response_format,
                ResponseFormat::JsonSchema { ref name, .. } if name == "Person"
            ));
            Ok(ChatResponse {
                text: self.0.to_string(),
                model: None,
            })
        }
    }

    #[test]
    fn test_schema_shape() {
        let schema = person_schema().to_json();
        assert_eq!(schema["properties"]["age"]["type"], "integer");
        assert_eq!(schema["required"], json!(["name", "age", "height", "married"]));
        assert_eq!(schema["additionalProperties"], false);
    }

    #[tokio::test]
    async fn test_extracts_person() {
        let extractor = StructuredOutputExtractor::new(Arc::new(Json(
            r#"{"name":"John","age":42,"height":1.75,"married":false}"#,
        )));
        let person: Person = extractor
            .extract("John is 42 years old...", &person_schema())
            .await
            .unwrap();
        assert_eq!(
            person,
            Person {
                name: "John".into(),
                age: 42,
                height: 1.75,
                married: false,
            }
        );
    }

    #[tokio::test]
    async fn test_schema_violation_is_reported() {
        let extractor = StructuredOutputExtractor::new(Arc::new(Json(
            r#"{"name":"John","age":"forty-two","height":1.75,"married":false}"#,
        )));
        let err = extractor
            .extract::<Person>("John is 42 years old...", &person_schema())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Generation(ref msg) if msg.contains("Person")));
    }

    #[test]
    fn test_fenced_reply() {
        assert_eq!(strip_json_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fences(" {\"a\":1} "), "{\"a\":1}");
    }
}
