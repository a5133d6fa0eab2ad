//! MCP (Model Context Protocol) server for Recall.
//!
//! Exposes the knowledge store to AI coding assistants over stdio.
//! The server implements the following tools:
//! - `search`: Full-text search over knowledge items
//! - `get`: Fetch one item by ID
//! - `add`: Store a new item
//! - `feedback`: Record whether an item was useful
//! - `log`: Append to the session's flight recorder

pub mod protocol;
pub mod server;
pub mod tools;

pub use server::{run_server, McpServer};
pub use tools::ToolContext;
