//! Wire types shared by the controller and content sides of the bridge.
//!
//! Every message on a transport is an [`Envelope`]: a channel name plus a JSON
//! payload. Two channels exist:
//!
//! - `"jsonrpc"` carries [`Request`]s (controller → content) and
//!   [`Response`]s (content → controller), correlated by `id`.
//! - `"test:postMessageToWorker"` carries a [`WorkerPost`] and an empty reply
//!   that only signals completion.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Channel for method dispatch requests and their responses.
pub const JSONRPC_CHANNEL: &str = "jsonrpc";

/// Channel for uncorrelated worker posts.
pub const POST_MESSAGE_TO_WORKER_CHANNEL: &str = "test:postMessageToWorker";

/// Protocol version sent in the WebSocket hello handshake.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Ids the controller allocates. The content side echoes any JSON id back.
pub type RequestId = u64;

/// One message on a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn request(request: &Request) -> Result<Self> {
        Ok(Self::new(JSONRPC_CHANNEL, serde_json::to_value(request)?))
    }

    pub fn response(response: &Response) -> Result<Self> {
        Ok(Self::new(JSONRPC_CHANNEL, serde_json::to_value(response)?))
    }

    pub fn worker_post(url: &str, message: Value) -> Result<Self> {
        let post = WorkerPost {
            url: url.to_string(),
            message,
        };
        Ok(Self::new(
            POST_MESSAGE_TO_WORKER_CHANNEL,
            serde_json::to_value(post)?,
        ))
    }

    /// Completion signal for a [`WorkerPost`]; carries no payload.
    pub fn worker_post_done() -> Self {
        Self::new(POST_MESSAGE_TO_WORKER_CHANNEL, Value::Null)
    }
}

/// A call to a registered remote function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    pub id: Value,
}

impl Request {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
            id: id.into(),
        }
    }
}

/// Outcome of one dispatch. Exactly one of result or error by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Result(Value),
    Error(String),
}

/// The single answer to a [`Request`].
///
/// On the wire this is `{"result": .., "error": .., "id": ..}` with `error`
/// null on success and `result` null on failure. A void success therefore
/// encodes as both fields null; decoding treats a null `error` as success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireResponse", from = "WireResponse")]
pub struct Response {
    pub id: Value,
    pub outcome: Outcome,
}

impl Response {
    pub fn success(id: impl Into<Value>, result: Value) -> Self {
        Self {
            id: id.into(),
            outcome: Outcome::Result(result),
        }
    }

    pub fn failure(id: impl Into<Value>, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = "Error".to_string();
        }
        Self {
            id: id.into(),
            outcome: Outcome::Error(message),
        }
    }

    /// Flatten a local result into a response, stringifying the error.
    pub fn from_result(id: impl Into<Value>, result: Result<Value>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(e) => Self::failure(id, e.to_string()),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(v) => Some(v),
            Outcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Result(_) => None,
            Outcome::Error(e) => Some(e),
        }
    }

    pub fn into_result(self) -> Result<Value> {
        match self.outcome {
            Outcome::Result(v) => Ok(v),
            Outcome::Error(e) => Err(BridgeError::Remote(e)),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct WireResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
    id: Value,
}

impl From<Response> for WireResponse {
    fn from(response: Response) -> Self {
        match response.outcome {
            Outcome::Result(result) => Self {
                result,
                error: None,
                id: response.id,
            },
            Outcome::Error(error) => Self {
                result: Value::Null,
                error: Some(error),
                id: response.id,
            },
        }
    }
}

impl From<WireResponse> for Response {
    fn from(wire: WireResponse) -> Self {
        match wire.error {
            Some(error) => Response::failure(wire.id, error),
            None => Response::success(wire.id, wire.result),
        }
    }
}

/// Payload of the `"test:postMessageToWorker"` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPost {
    pub url: String,
    #[serde(default)]
    pub message: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_response_has_null_error() {
        let wire = serde_json::to_value(Response::success(1, json!(2))).unwrap();
        assert_eq!(wire, json!({ "result": 2, "error": null, "id": 1 }));
    }

    #[test]
    fn failure_response_has_null_result() {
        let wire = serde_json::to_value(Response::failure(2, "boom")).unwrap();
        assert_eq!(wire, json!({ "result": null, "error": "boom", "id": 2 }));
    }

    #[test]
    fn empty_failure_message_is_replaced() {
        let response = Response::failure(3, "");
        assert_eq!(response.error(), Some("Error"));
    }

    #[test]
    fn void_success_decodes_as_result() {
        let response: Response =
            serde_json::from_value(json!({ "result": null, "error": null, "id": 9 })).unwrap();
        assert_eq!(response.outcome, Outcome::Result(Value::Null));
        assert_eq!(response.id, 9);
    }

    #[test]
    fn error_wins_when_decoding() {
        let response: Response =
            serde_json::from_value(json!({ "result": 5, "error": "bad", "id": 4 })).unwrap();
        assert_eq!(response.error(), Some("bad"));
        assert!(response.result().is_none());
    }

    #[test]
    fn non_numeric_ids_are_preserved() {
        let request: Request =
            serde_json::from_value(json!({ "method": "evaluate", "params": ["1"], "id": "req-1" }))
                .unwrap();
        assert_eq!(request.id, json!("req-1"));

        let wire = serde_json::to_value(Response::success(request.id, json!(1))).unwrap();
        assert_eq!(wire, json!({ "result": 1, "error": null, "id": "req-1" }));
    }

    #[test]
    fn request_params_default_to_empty() {
        let request: Request =
            serde_json::from_value(json!({ "method": "evaluate", "id": 1 })).unwrap();
        assert!(request.params.is_empty());
    }

    #[test]
    fn remote_error_surfaces_message() {
        let err = Response::failure(1, "ReferenceError: x is not defined")
            .into_result()
            .unwrap_err();
        assert_eq!(err.to_string(), "ReferenceError: x is not defined");
    }
}
