//! Recall - organizational memory for AI coding assistants
//!
//! Recall keeps a searchable store of patterns, failures, decisions and
//! context, and serves it to assistants over the Model Context Protocol.
//! Assistants rate what they retrieve and keep a per-session flight
//! recorder of what they did.

pub mod config;
pub mod mcp;
pub mod storage;
