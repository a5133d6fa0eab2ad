//! JSON-RPC 2.0 envelope types for the MCP stdio transport.
//!
//! Transport faults (unparseable lines, unknown methods, malformed call
//! envelopes) are represented by [`RpcError`] and always become an `error`
//! object on the wire. Tool failures never pass through here; they travel
//! inside a successful `result`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// A JSON-RPC request or notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    /// Not validated; clients that omit it are still served
    #[serde(default)]
    pub jsonrpc: String,

    /// Absent (or null) for notifications
    #[serde(default)]
    pub id: Option<Value>,

    pub method: String,

    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    /// The id to echo back, `null` when the request carried none.
    pub fn response_id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }

    /// Notifications are one-way and never answered.
    pub fn is_notification(&self) -> bool {
        self.method.starts_with("notifications/")
    }
}

/// A JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Create a successful response
    pub fn success(id: Value, result: Value) -> Self {
        Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn failure(id: Value, err: RpcError) -> Self {
        Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(err.into()),
        }
    }
}

/// The `error` member of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
}

impl From<RpcError> for ErrorObject {
    fn from(err: RpcError) -> Self {
        ErrorObject {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Faults rejected at the protocol boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    /// The line was not valid JSON.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Valid JSON, but not a request object.
    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    /// The method is not one this server implements.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// `tools/call` named a tool that is not in the catalog.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The `tools/call` envelope could not be read.
    #[error("Invalid params: {0}")]
    InvalidParams(String),
}

impl RpcError {
    /// Get the JSON-RPC error code
    pub fn code(&self) -> i32 {
        match self {
            RpcError::ParseError(_) => -32700,
            RpcError::InvalidRequest(_) => -32600,
            RpcError::MethodNotFound(_) | RpcError::UnknownTool(_) => -32601,
            RpcError::InvalidParams(_) => -32602,
        }
    }
}

/// A request that could not be parsed, with the id to answer it under.
#[derive(Debug)]
pub struct Rejected {
    pub id: Value,
    pub error: RpcError,
}

/// Parse one line of input into a request.
pub fn parse_request(line: &str) -> Result<Request, Rejected> {
    let value: Value = serde_json::from_str(line).map_err(|e| Rejected {
        id: recover_id(line),
        error: RpcError::ParseError(e.to_string()),
    })?;

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    if !value.is_object() {
        return Err(Rejected {
            id,
            error: RpcError::InvalidRequest("expected a JSON object".to_string()),
        });
    }

    serde_json::from_value(value).map_err(|e| Rejected {
        id,
        error: RpcError::InvalidRequest(e.to_string()),
    })
}

/// Rejects a line whose bytes are not valid UTF-8.
pub fn reject_invalid_utf8(raw: &[u8], err: &std::str::Utf8Error) -> Rejected {
    Rejected {
        id: recover_id(&String::from_utf8_lossy(raw)),
        error: RpcError::ParseError(format!("invalid UTF-8: {err}")),
    }
}

/// Matches the value following an `"id"` key: a number or a string.
static ID_VALUE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^\s*:\s*(-?\d+|"(?:[^"\\]|\\.)*")"#).ok());

/// Best-effort scan of a malformed line for the request id.
///
/// Only an `"id"` key directly inside the outermost object counts, so ids
/// nested in `params` are never echoed back.
fn recover_id(raw: &str) -> Value {
    let Some(re) = ID_VALUE.as_ref() else {
        return Value::Null;
    };

    let bytes = raw.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth = depth.saturating_sub(1),
            b'"' => {
                let end = string_end(bytes, i);
                if depth == 1 && &raw[i..end] == "\"id\"" {
                    if let Some(value) = re
                        .captures(&raw[end..])
                        .and_then(|caps| caps.get(1))
                        .and_then(|m| serde_json::from_str(m.as_str()).ok())
                    {
                        return value;
                    }
                }
                i = end;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    Value::Null
}

/// Index just past the string literal opening at `start`, or the end of input.
fn string_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}
