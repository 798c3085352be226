//! MCP Server for Mnemosyne
//!
//! Exposes memory search and management as MCP tools over stdio.

mod server;

pub use server::run_mcp_server;
