//! Line-delimited JSON-RPC 2.0 framing. `spec.md` §6 fixes the transport as
//! "line-delimited JSON-RPC 2.0 over a bidirectional byte stream" — unlike
//! the teacher, this dispatcher does not also accept LSP `Content-Length`
//! framing; every message is exactly one `\n`-terminated JSON object.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead, Write};

/// A single incoming JSON-RPC request or notification (no `id`).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// A JSON-RPC response. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `-32700 Parse error`
    #[must_use]
    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::new(-32700, "Parse error").with_data(serde_json::json!({ "details": detail.to_string() }))
    }

    /// `-32601 Method not found`
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, "Method not found").with_data(serde_json::json!({ "method": method }))
    }
}

/// Read one `\n`-terminated line from `reader`. Blank lines are skipped.
/// Returns `Ok(None)` on EOF.
///
/// # Errors
///
/// Propagates the underlying reader's I/O errors.
pub fn read_line<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return Ok(Some(trimmed.to_string()));
    }
}

/// Write one JSON-RPC message as a single line, flushing immediately so the
/// peer observes it without buffering delay.
///
/// # Errors
///
/// Propagates the underlying writer's I/O errors.
pub fn write_line<W: Write>(writer: &mut W, body: &str) -> io::Result<()> {
    writeln!(writer, "{body}")?;
    writer.flush()
}
