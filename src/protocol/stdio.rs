//! Line-delimited stdio transport for the agent protocol (§6).
//!
//! stdout carries only JSON-RPC response bytes; every other subsystem logs
//! to stderr (see [`crate::logging`]).

use crate::protocol::jsonrpc::JsonRpcResponse;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Reads one line at a time from stdin, writes framed responses to stdout.
pub struct StdioTransport {
    stdin: BufReader<tokio::io::Stdin>,
    stdout: tokio::io::Stdout,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            stdin: BufReader::new(tokio::io::stdin()),
            stdout: tokio::io::stdout(),
        }
    }

    /// Read the next line, trimmed of its newline. Returns `Ok(None)` on EOF.
    /// Blank lines are skipped, matching the MCP stdio convention.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            let mut line = String::new();
            let bytes_read = self.stdin.read_line(&mut line).await?;
            if bytes_read == 0 {
                return Ok(None);
            }
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(trimmed.to_string()));
        }
    }

    /// Write one response, newline-delimited, flushing immediately.
    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> std::io::Result<()> {
        let mut bytes = serde_json::to_vec(response).expect("JsonRpcResponse always serializes");
        bytes.push(b'\n');
        self.stdout.write_all(&bytes).await?;
        self.stdout.flush().await
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}
