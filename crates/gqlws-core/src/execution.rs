//! GraphQL execution result and error wire shapes.
//!
//! [`ExecutionResult::to_specification`] renders a result the way the GraphQL
//! response format requires: `data` is always present, `errors` only when
//! non-empty, `extensions` only when set.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Classification attached to errors the protocol layer synthesises.
pub const DATA_FETCHING_CLASSIFICATION: &str = "DataFetchingException";

/// Line/column of an error in the query document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

/// A single GraphQL error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    /// Human-readable description.
    pub message: String,
    /// Document locations the error refers to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<SourceLocation>,
    /// Response path of the failing field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    /// Implementation-specific detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphQlError {
    /// An error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }

    /// An error classified as a data-fetching failure.
    pub fn data_fetching(message: impl Into<String>) -> Self {
        let mut extensions = Map::new();
        let _ = extensions.insert(
            "classification".into(),
            Value::String(DATA_FETCHING_CLASSIFICATION.into()),
        );
        Self {
            extensions: Some(extensions),
            ..Self::new(message)
        }
    }

    /// Attach a response path.
    #[must_use]
    pub fn with_path(mut self, path: Vec<Value>) -> Self {
        self.path = Some(path);
        self
    }

    /// Attach a document location.
    #[must_use]
    pub fn with_location(mut self, line: u32, column: u32) -> Self {
        self.locations.push(SourceLocation { line, column });
        self
    }

    /// Render as a JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            let mut map = Map::new();
            let _ = map.insert("message".into(), Value::String(self.message.clone()));
            Value::Object(map)
        })
    }
}

/// Outcome of executing one operation (or one subscription event).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionResult {
    /// Result data; `None` renders as `null`.
    pub data: Option<Value>,
    /// Errors raised during execution.
    pub errors: Vec<GraphQlError>,
    /// Implementation-specific response extensions.
    pub extensions: Option<Map<String, Value>>,
}

impl ExecutionResult {
    /// A successful result carrying `data`.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// A failed result carrying only errors.
    pub fn errors(errors: Vec<GraphQlError>) -> Self {
        Self {
            errors,
            ..Self::default()
        }
    }

    /// Attach response extensions.
    #[must_use]
    pub fn with_extensions(mut self, extensions: Map<String, Value>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Whether any errors were raised.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Render in GraphQL response format.
    pub fn to_specification(&self) -> Value {
        let mut map = Map::new();
        let _ = map.insert("data".into(), self.data.clone().unwrap_or(Value::Null));
        if !self.errors.is_empty() {
            let errors = self.errors.iter().map(GraphQlError::to_value).collect();
            let _ = map.insert("errors".into(), Value::Array(errors));
        }
        if let Some(ref extensions) = self.extensions {
            let _ = map.insert("extensions".into(), Value::Object(extensions.clone()));
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn specification_without_errors() {
        let result = ExecutionResult::data(json!({"hello": "world"}));
        assert_eq!(
            result.to_specification(),
            json!({"data": {"hello": "world"}})
        );
        assert!(!result.has_errors());
    }

    #[test]
    fn response_with_errors_and_null_data() {
        let result = ExecutionResult::errors(vec![GraphQlError::new("bad field")]);
        let body = result.to_specification();
        assert_eq!(body["data"], Value::Null);
        assert_eq!(body["errors"][0]["message"], "bad field");
        assert!(result.has_errors());
    }

    #[test]
    fn specification_includes_extensions() {
        let mut ext = Map::new();
        let _ = ext.insert("cost".into(), json!(3));
        let result = ExecutionResult::data(json!(1)).with_extensions(ext);
        assert_eq!(result.to_specification()["extensions"]["cost"], 3);
    }

    #[test]
    fn data_fetching_error_classification() {
        let err = GraphQlError::data_fetching("boom");
        let value = err.to_value();
        assert_eq!(value["message"], "boom");
        assert_eq!(value["extensions"]["classification"], DATA_FETCHING_CLASSIFICATION);
        assert!(value.get("locations").is_none());
    }

    #[test]
    fn error_with_path_and_location() {
        let err = GraphQlError::new("nope")
            .with_path(vec![json!("user"), json!(0)])
            .with_location(2, 5);
        let value = err.to_value();
        assert_eq!(value["path"], json!(["user", 0]));
        assert_eq!(value["locations"], json!([{"line": 2, "column": 5}]));
    }

    #[test]
    fn error_deserializes_with_defaults() {
        let err: GraphQlError = serde_json::from_value(json!({"message": "m"})).unwrap();
        assert_eq!(err, GraphQlError::new("m"));
    }
}
