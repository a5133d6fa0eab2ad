//! Line-delimited JSON-RPC dispatcher.
//!
//! Reads one request per line, answers in arrival order and stops when the
//! input closes or a shutdown signal arrives. Only one request is ever in
//! flight, so the server owns the database handle outright.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;

use super::protocol::{
    parse_request, reject_invalid_utf8, Request, Response, RpcError, PROTOCOL_VERSION,
};
use super::tools::{all_tools, call_tool, tool_result, Tool, ToolContext};
use crate::storage::Database;

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "recall";

/// The Recall MCP server.
pub struct McpServer {
    db: Database,
    ctx: ToolContext,
}

impl McpServer {
    /// Creates a server over an already opened store.
    pub fn new(db: Database, ctx: ToolContext) -> Self {
        Self { db, ctx }
    }

    /// Returns the store so the caller can close it.
    pub fn into_database(self) -> Database {
        self.db
    }

    /// Serves requests from `reader` until it closes or `shutdown` fires.
    ///
    /// A shutdown signal is only observed between requests; a request that
    /// has been read is always answered first.
    pub async fn serve<R, W>(
        &mut self,
        mut reader: R,
        mut writer: W,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = Vec::new();

        loop {
            line.clear();

            let read = tokio::select! {
                biased;
                signal = shutdown.recv() => {
                    match signal {
                        Ok(()) => tracing::info!("Shutdown requested, stopping MCP server"),
                        Err(e) => {
                            tracing::warn!("Shutdown signal lost ({}), stopping MCP server", e)
                        }
                    }
                    break;
                }
                read = reader.read_until(b'\n', &mut line) => read,
            };

            let bytes = match read {
                Ok(n) => n,
                Err(e) => {
                    tracing::error!("Failed to read from input: {}", e);
                    return Err(e).context("Failed to read request");
                }
            };

            if bytes == 0 {
                tracing::info!("Input closed, stopping MCP server");
                break;
            }

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            if let Some(response) = self.handle_bytes(&line) {
                let mut text = serde_json::to_string(&response)
                    .context("Failed to serialize response")?;
                tracing::debug!("-> {}", text);
                text.push('\n');

                writer
                    .write_all(text.as_bytes())
                    .await
                    .context("Failed to write response")?;
                writer.flush().await.context("Failed to flush output")?;
            }
        }

        Ok(())
    }

    /// Handles one raw input line. Bytes that are not UTF-8 are a parse error.
    pub fn handle_bytes(&mut self, raw: &[u8]) -> Option<Response> {
        match std::str::from_utf8(raw) {
            Ok(text) => {
                let trimmed = text.trim();
                tracing::debug!("<- {}", trimmed);
                self.handle_line(trimmed)
            }
            Err(e) => {
                let rejected = reject_invalid_utf8(raw, &e);
                tracing::warn!("Rejected request: {}", rejected.error);
                Some(Response::failure(rejected.id, rejected.error))
            }
        }
    }

    /// Handles a single raw line. Returns `None` for notifications.
    pub fn handle_line(&mut self, line: &str) -> Option<Response> {
        match parse_request(line) {
            Ok(request) => self.handle_request(request),
            Err(rejected) => {
                tracing::warn!("Rejected request: {}", rejected.error);
                Some(Response::failure(rejected.id, rejected.error))
            }
        }
    }

    fn handle_request(&mut self, request: Request) -> Option<Response> {
        if request.is_notification() {
            tracing::debug!("Notification {}", request.method);
            return None;
        }

        let id = request.response_id();
        let outcome = match request.method.as_str() {
            "initialize" => Ok(initialize_result()),
            "tools/list" => Ok(json!({ "tools": all_tools() })),
            "tools/call" => self.handle_tool_call(request.params),
            "ping" => Ok(json!({})),
            other => {
                tracing::warn!("Unknown method: {}", other);
                Err(RpcError::MethodNotFound(other.to_string()))
            }
        };

        Some(match outcome {
            Ok(result) => Response::success(id, result),
            Err(err) => Response::failure(id, err),
        })
    }

    fn handle_tool_call(&mut self, params: Option<Value>) -> Result<Value, RpcError> {
        let (name, arguments) = read_call_envelope(params)?;
        let tool = Tool::parse(&name).ok_or(RpcError::UnknownTool(name))?;

        tracing::debug!("Calling tool {}", tool.name());
        let outcome = call_tool(tool, arguments, &mut self.db, &self.ctx);
        if let Err(e) = &outcome {
            tracing::debug!("Tool {} failed: {}", tool.name(), e);
        }

        Ok(tool_result(outcome))
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": { "tools": {} },
    })
}

/// Splits `tools/call` params into the tool name and its arguments.
///
/// Missing or null `arguments` become an empty object.
fn read_call_envelope(params: Option<Value>) -> Result<(String, Value), RpcError> {
    let Some(Value::Object(mut params)) = params else {
        return Err(RpcError::InvalidParams(
            "tools/call params must be an object".to_string(),
        ));
    };

    let name = match params.remove("name") {
        Some(Value::String(name)) => name,
        Some(_) => {
            return Err(RpcError::InvalidParams("name must be a string".to_string()));
        }
        None => return Err(RpcError::InvalidParams("name is required".to_string())),
    };

    let arguments = match params.remove("arguments") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(args @ Value::Object(_)) => args,
        Some(_) => {
            return Err(RpcError::InvalidParams(
                "arguments must be an object".to_string(),
            ));
        }
    };

    Ok((name, arguments))
}

/// Runs the MCP server on stdin/stdout until the client disconnects or
/// Ctrl+C is received.
///
/// The store is closed on every exit path.
pub async fn run_server(db: Database, ctx: ToolContext) -> Result<()> {
    tracing::info!(
        "Starting MCP server (session {}, project {})",
        ctx.session_id,
        ctx.project_path.as_deref().unwrap_or("none")
    );

    // The sender outlives the signal task so a failed Ctrl+C hook cannot
    // close the channel and end the loop.
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl+C, shutting down...");
                let _ = signal_tx.send(());
            }
            Err(e) => tracing::warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let mut server = McpServer::new(db, ctx);
    let served = server
        .serve(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            shutdown_rx,
        )
        .await;

    drop(shutdown_tx);

    let closed = server.into_database().close();
    served?;
    closed?;

    tracing::info!("MCP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_server() -> (McpServer, tempfile::TempDir) {
        let dir = tempdir().expect("Failed to create temp directory");
        let db = Database::open(&dir.path().join("server.db")).expect("Failed to open database");
        let ctx = ToolContext {
            session_id: "session-1".to_string(),
            project_path: None,
        };
        (McpServer::new(db, ctx), dir)
    }

    fn call(server: &mut McpServer, line: &str) -> Value {
        let response = server.handle_line(line).expect("Expected a response");
        serde_json::to_value(response).unwrap()
    }

    #[test]
    fn test_initialize() {
        let (mut server, _dir) = create_test_server();
        let resp = call(
            &mut server,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        );
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(resp["result"]["serverInfo"]["name"], "recall");
        assert!(resp["result"]["capabilities"]["tools"].is_object());
    }

    #[test]
    fn test_ping() {
        let (mut server, _dir) = create_test_server();
        let resp = call(&mut server, r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#);
        assert_eq!(resp["id"], "p");
        assert_eq!(resp["result"], json!({}));
    }

    #[test]
    fn test_notifications_get_no_response() {
        let (mut server, _dir) = create_test_server();
        assert!(server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .is_none());
        assert!(server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{}}"#)
            .is_none());
    }

    #[test]
    fn test_unknown_method() {
        let (mut server, _dir) = create_test_server();
        let resp = call(&mut server, r#"{"jsonrpc":"2.0","id":9,"method":"resources/list"}"#);
        assert_eq!(resp["id"], 9);
        assert_eq!(resp["error"]["code"], -32601);
    }

    #[test]
    fn test_unknown_tool_is_method_not_found() {
        let (mut server, _dir) = create_test_server();
        let resp = call(
            &mut server,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"delete","arguments":{}}}"#,
        );
        assert_eq!(resp["error"]["code"], -32601);
        assert!(resp["error"]["message"].as_str().unwrap().contains("delete"));
    }

    #[test]
    fn test_malformed_call_envelopes() {
        let (mut server, _dir) = create_test_server();
        for line in [
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call"}"#,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":[1]}"#,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"arguments":{}}}"#,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":7}}"#,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"get","arguments":"x"}}"#,
        ] {
            let resp = call(&mut server, line);
            assert_eq!(resp["error"]["code"], -32602, "line: {line}");
            assert_eq!(resp["id"], 4);
        }
    }

    #[test]
    fn test_missing_arguments_default_to_empty_object() {
        let (mut server, _dir) = create_test_server();
        let resp = call(
            &mut server,
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"search"}}"#,
        );
        assert!(resp.get("error").is_none());
        assert_eq!(resp["result"]["isError"], true);
    }

    #[test]
    fn test_parse_error_echoes_recovered_id() {
        let (mut server, _dir) = create_test_server();
        let resp = call(&mut server, r#"{"jsonrpc":"2.0","id":77,"method":"#);
        assert_eq!(resp["error"]["code"], -32700);
        assert_eq!(resp["id"], 77);
    }

    #[tokio::test]
    async fn test_serve_skips_blank_lines_and_stops_at_eof() {
        let (mut server, _dir) = create_test_server();
        let input = concat!(
            "\n",
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n   \n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        let (_tx, rx) = broadcast::channel(1);
        let mut output = Vec::new();

        server
            .serve(input.as_bytes(), &mut output, rx)
            .await
            .expect("serve should succeed");

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2, "Expected exactly two responses, got {text}");

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);
        assert_eq!(second["result"]["tools"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_invalid_utf8_is_parse_error() {
        let (mut server, _dir) = create_test_server();
        let response = server
            .handle_bytes(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"\xff\xfe\"}")
            .expect("Expected a response");
        let resp = serde_json::to_value(response).unwrap();
        assert_eq!(resp["error"]["code"], -32700);
        assert_eq!(resp["id"], 2);
    }

    #[tokio::test]
    async fn test_serve_survives_invalid_utf8_line() {
        let (mut server, _dir) = create_test_server();
        let mut input = Vec::new();
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n");
        input.extend_from_slice(b"{\"id\":2,\"method\":\"\xff\xfe\"}\n");
        input.extend_from_slice(b"\x00\x9f\x92\x96\n");
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"ping\"}\n");
        let (_tx, rx) = broadcast::channel(1);
        let mut output = Vec::new();

        server
            .serve(input.as_slice(), &mut output, rx)
            .await
            .expect("serve should keep going after bad bytes");

        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses.len(), 4);
        assert_eq!(responses[0]["result"], json!({}));
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["error"]["code"], -32700);
        assert_eq!(responses[2]["id"], Value::Null);
        assert_eq!(responses[2]["error"]["code"], -32700);
        assert_eq!(responses[3]["id"], 3);
        assert_eq!(responses[3]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_serve_stops_when_shutdown_sender_dropped() {
        let (mut server, _dir) = create_test_server();
        let (tx, rx) = broadcast::channel::<()>(1);
        drop(tx);

        let (_client, server_side) = tokio::io::duplex(64);
        let mut output = Vec::new();

        server
            .serve(BufReader::new(server_side), &mut output, rx)
            .await
            .expect("serve should stop cleanly");
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let (mut server, _dir) = create_test_server();
        let (tx, rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        // A reader that never yields a line; only the signal can end the loop.
        let (client, server_side) = tokio::io::duplex(64);
        let mut output = Vec::new();

        server
            .serve(BufReader::new(server_side), &mut output, rx)
            .await
            .expect("serve should stop cleanly");
        assert!(output.is_empty());
        drop(client);
    }
}
