//! Execution gateway seam: operation input, output shapes, and the trait
//! the query engine implements.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use gqlws_core::{ExecutionResult, GraphQlError};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::info::SessionInfo;

/// Boxed stream of subscription results.
pub type ResultStream = Pin<Box<dyn Stream<Item = Result<ExecutionResult, GatewayError>> + Send>>;

/// Errors raised by the execution gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Execution failed; the message is reported to the client.
    #[error("{0}")]
    Execution(String),
    /// The engine could not accept the operation.
    #[error("execution gateway unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Convert to the error reported in an `error` frame.
    pub fn to_graphql_error(&self) -> GraphQlError {
        GraphQlError::data_fetching(self.to_string())
    }
}

/// A `subscribe` payload that cannot be executed.
#[derive(Debug, Error)]
#[error("invalid subscribe payload: {0}")]
pub struct InvalidPayload(#[from] serde_json::Error);

/// Gateway result: one outcome, or a live stream of outcomes.
pub enum ExecutionOutput {
    /// Query or mutation result.
    Single(ExecutionResult),
    /// Subscription event stream.
    Stream(ResultStream),
}

impl ExecutionOutput {
    /// Wrap any stream of results.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<ExecutionResult, GatewayError>> + Send + 'static,
    {
        Self::Stream(Box::pin(stream))
    }

    /// Whether this is a subscription stream.
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

impl fmt::Debug for ExecutionOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(result) => f.debug_tuple("Single").field(result).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<ExecutionResult> for ExecutionOutput {
    fn from(result: ExecutionResult) -> Self {
        Self::Single(result)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribePayload {
    query: String,
    #[serde(default)]
    operation_name: Option<String>,
    #[serde(default)]
    variables: Option<Map<String, Value>>,
    #[serde(default)]
    extensions: Option<Map<String, Value>>,
}

/// Everything the gateway needs to run one operation.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationInput {
    /// Client-chosen operation id.
    pub id: String,
    /// GraphQL document.
    pub query: String,
    /// Operation to run when the document has several.
    pub operation_name: Option<String>,
    /// Variable values.
    pub variables: Map<String, Value>,
    /// Request extensions.
    pub extensions: Map<String, Value>,
    /// Upgrade request URI.
    pub uri: String,
    /// Upgrade request headers.
    pub headers: BTreeMap<String, String>,
    /// Payload of the accepted `connection_init`.
    pub connection_params: Option<Map<String, Value>>,
}

impl OperationInput {
    /// Build from a `subscribe` payload and the connection metadata.
    pub fn from_subscribe(
        id: &str,
        payload: &Map<String, Value>,
        session: &SessionInfo,
    ) -> Result<Self, InvalidPayload> {
        let parsed: SubscribePayload = serde_json::from_value(Value::Object(payload.clone()))?;
        Ok(Self {
            id: id.to_owned(),
            query: parsed.query,
            operation_name: parsed.operation_name,
            variables: parsed.variables.unwrap_or_default(),
            extensions: parsed.extensions.unwrap_or_default(),
            uri: session.uri.clone(),
            headers: session.headers.clone(),
            connection_params: session.init_payload(),
        })
    }
}

/// The query-execution engine.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Execute one operation.
    async fn execute(&self, input: OperationInput) -> Result<ExecutionOutput, GatewayError>;
}

/// [`ExecutionGateway`] backed by an async closure. See [`gateway_fn`].
pub struct FnGateway<F>(F);

/// Adapt an async closure into an [`ExecutionGateway`].
pub fn gateway_fn<F, Fut>(f: F) -> FnGateway<F>
where
    F: Fn(OperationInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ExecutionOutput, GatewayError>> + Send,
{
    FnGateway(f)
}

#[async_trait]
impl<F, Fut> ExecutionGateway for FnGateway<F>
where
    F: Fn(OperationInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ExecutionOutput, GatewayError>> + Send,
{
    async fn execute(&self, input: OperationInput) -> Result<ExecutionOutput, GatewayError> {
        (self.0)(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn parse_full_payload() {
        let info = SessionInfo::new("/graphql").with_headers([("X-Tenant", "t1")]);
        let payload = object(json!({
            "query": "query Q($n: Int) { a(n: $n) }",
            "operationName": "Q",
            "variables": {"n": 3},
            "extensions": {"persisted": true}
        }));
        let input = OperationInput::from_subscribe("op1", &payload, &info).unwrap();
        assert_eq!(input.id, "op1");
        assert_eq!(input.operation_name.as_deref(), Some("Q"));
        assert_eq!(input.variables["n"], 3);
        assert_eq!(input.extensions["persisted"], true);
        assert_eq!(input.uri, "/graphql");
        assert_eq!(input.headers["x-tenant"], "t1");
        assert!(input.connection_params.is_none());
    }

    #[test]
    fn null_variables_become_empty() {
        let payload = object(json!({"query": "{ a }", "variables": null}));
        let input = OperationInput::from_subscribe("1", &payload, &SessionInfo::default()).unwrap();
        assert!(input.variables.is_empty());
        assert!(input.operation_name.is_none());
    }

    #[test]
    fn missing_query_is_invalid() {
        let payload = object(json!({"variables": {}}));
        let err = OperationInput::from_subscribe("1", &payload, &SessionInfo::default());
        assert_matches!(err, Err(InvalidPayload(_)));
    }

    #[test]
    fn connection_params_from_session() {
        let info = SessionInfo::default();
        info.set_init_payload(object(json!({"token": "abc"})));
        let payload = object(json!({"query": "{ a }"}));
        let input = OperationInput::from_subscribe("1", &payload, &info).unwrap();
        assert_eq!(input.connection_params.unwrap()["token"], "abc");
    }

    #[test]
    fn gateway_error_reported_as_data_fetching() {
        let err = GatewayError::Execution("resolver exploded".into()).to_graphql_error();
        assert_eq!(err.message, "resolver exploded");
        assert_eq!(
            err.extensions.unwrap()["classification"],
            "DataFetchingException"
        );
    }

    #[test]
    fn output_debug_hides_stream() {
        let output = ExecutionOutput::stream(futures::stream::empty());
        assert!(output.is_stream());
        assert_eq!(format!("{output:?}"), "Stream(..)");
        let single: ExecutionOutput = ExecutionResult::data(json!(1)).into();
        assert!(!single.is_stream());
    }

    #[tokio::test]
    async fn gateway_fn_runs_closure() {
        let gateway = gateway_fn(|input: OperationInput| async move {
            Ok(ExecutionOutput::Single(ExecutionResult::data(json!({"echo": input.query}))))
        });
        let payload = object(json!({"query": "{ ping }"}));
        let input = OperationInput::from_subscribe("1", &payload, &SessionInfo::default()).unwrap();
        let output = gateway.execute(input).await.unwrap();
        assert_matches!(output, ExecutionOutput::Single(r) if r.data == Some(json!({"echo": "{ ping }"})));
    }
}
