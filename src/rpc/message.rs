//! JSON-RPC 2.0 message shapes

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::rpc::error::SessionError;

/// JSON-RPC error code for an unsupported method
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(id) => write!(f, "{}", id),
            RequestId::String(id) => write!(f, "{:?}", id),
        }
    }
}

/// The `error` member of a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("Unhandled method {}", method),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: RequestId,
        method: String,
        params: Value,
    },
    Response {
        /// `None` when the peer could not read the id of the request it answers
        id: Option<RequestId>,
        outcome: Result<Value, ResponseError>,
    },
    Notification {
        method: String,
        params: Value,
    },
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ResponseError>,
}

impl Message {
    pub fn request(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Message::Request {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Message::Notification {
            method: method.into(),
            params,
        }
    }

    pub fn response(id: RequestId, outcome: Result<Value, ResponseError>) -> Self {
        Message::Response {
            id: Some(id),
            outcome,
        }
    }

    /// Classifies a decoded JSON value.
    ///
    /// A message with a `method` is a request when it also carries an `id`,
    /// otherwise a notification. Anything without a `method` must be a response.
    pub fn from_value(value: Value) -> Result<Self, SessionError> {
        let has_id = value.get("id").is_some();
        let raw: RawMessage = serde_json::from_value(value)?;
        let params = raw.params.unwrap_or(Value::Null);

        match (raw.method, raw.id) {
            (Some(method), Some(id)) => Ok(Message::Request { id, method, params }),
            (Some(method), None) => Ok(Message::Notification { method, params }),
            (None, id) if has_id => {
                let outcome = match raw.error {
                    Some(error) => Err(error),
                    None => Ok(raw.result.unwrap_or(Value::Null)),
                };
                Ok(Message::Response { id, outcome })
            }
            (None, _) => Err(SessionError::framing(
                "message has neither a method nor an id",
            )),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Message::Request { id, method, params } => {
                let mut value = json!({ "jsonrpc": "2.0", "id": id, "method": method });
                insert_params(&mut value, params);
                value
            }
            Message::Notification { method, params } => {
                let mut value = json!({ "jsonrpc": "2.0", "method": method });
                insert_params(&mut value, params);
                value
            }
            Message::Response { id, outcome } => match outcome {
                Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                Err(error) => json!({ "jsonrpc": "2.0", "id": id, "error": error }),
            },
        }
    }
}

// Parameterless methods such as `shutdown` and `exit` must omit `params`.
fn insert_params(message: &mut Value, params: &Value) {
    if params.is_null() {
        return;
    }
    if let Some(object) = message.as_object_mut() {
        object.insert("params".to_string(), params.clone());
    }
}
