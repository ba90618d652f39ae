//! Backend transport abstraction and response envelopes.

use crate::error::{MmsError, MmsResult};
use async_trait::async_trait;
use serde_json::Value;

/// A failed exchange as seen by the transport: status plus whatever body came back.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportError {
    /// HTTP status, or 0 if no response was received.
    pub status: u16,
    pub data: Value,
}

impl TransportError {
    pub fn new(status: u16, data: Value) -> Self {
        Self { status, data }
    }

    /// The request never produced an HTTP response.
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            status: 0,
            data: serde_json::json!({ "error": reason.into() }),
        }
    }
}

impl From<TransportError> for MmsError {
    fn from(err: TransportError) -> Self {
        MmsError::from_http(err.status, err.data)
    }
}

/// Transport used by the services to reach the backend.
///
/// Implementations return the decoded JSON body of a 2xx response, or a
/// [`TransportError`] for everything else.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Value, TransportError>;

    async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value, TransportError>;
}

/// Extract the array stored under `kind` in a response envelope.
pub fn envelope_list(data: &Value, kind: &str) -> MmsResult<Vec<Value>> {
    match data.get(kind) {
        Some(Value::Array(items)) => Ok(items.clone()),
        _ => Err(MmsError::malformed(format!("response has no '{kind}' array"))),
    }
}

/// Extract the first element of the `kind` array in a response envelope.
pub fn envelope_first(data: &Value, kind: &str) -> MmsResult<Value> {
    data.get(kind)
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .cloned()
        .ok_or_else(|| MmsError::malformed(format!("response has no '{kind}' entries")))
}
