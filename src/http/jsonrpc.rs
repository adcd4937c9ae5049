//! JSON-RPC envelope inspection and synthetic error payloads.
//!
//! Only `id` and `method` are read; everything else is forwarded verbatim.

use serde_json::{json, Value};

/// JSON-RPC code used for simulated failures.
pub const PROXY_DENIED_CODE: i64 = -32603;

/// Message used for simulated failures.
pub const PROXY_DENIED_MESSAGE: &str = "Internal error - Proxy Denied";

/// The parts of a JSON-RPC request the proxy acts on.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Envelope {
    /// Request id; `None` when absent or null (notifications).
    pub id: Option<Value>,
    /// Method name; `None` when absent or not a string (e.g. batches).
    pub method: Option<String>,
}

impl Envelope {
    /// Parse a JSON document. Returns `None` if it is not valid JSON.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Value>(bytes).ok().map(|v| Self::from_value(&v))
    }

    pub fn from_value(value: &Value) -> Self {
        let id = value.get("id").filter(|id| !id.is_null()).cloned();
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_owned);
        Self { id, method }
    }

    /// Method name used for rule selection; empty when missing.
    pub fn method_name(&self) -> &str {
        self.method.as_deref().unwrap_or("")
    }
}

/// Key identifying a request id within one connection. Uses the canonical JSON
/// text, so `1` and `"1"` stay distinct.
pub fn id_key(id: &Value) -> String {
    id.to_string()
}

/// JSON-RPC error frame sent over WebSocket for a simulated failure.
pub fn proxy_denied_frame(id: Option<&Value>) -> String {
    json!({
        "id": id.cloned().unwrap_or(Value::Null),
        "jsonrpc": "2.0",
        "error": {
            "code": PROXY_DENIED_CODE,
            "message": PROXY_DENIED_MESSAGE,
        },
    })
    .to_string()
}

/// `{ "error": message }` body used by the HTTP bridge.
pub fn error_body(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}
