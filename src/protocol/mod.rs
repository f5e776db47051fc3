//! The agent protocol: JSON-RPC framing, stdio transport, dispatch (§6, Component G).

pub mod jsonrpc;
pub mod server;
pub mod stdio;

pub use jsonrpc::{JsonRpcResponse, RequestId};
pub use server::{DispatchOutcome, Server, ToolHandler};
pub use stdio::StdioTransport;
