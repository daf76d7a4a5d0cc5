//! MCP protocol types and JSON-RPC implementation.
//!
//! This crate provides:
//! - JSON-RPC 2.0 message types
//! - MCP method params/results (tools, resources, prompts, completion,
//!   logging, roots, sampling)
//! - Protocol version negotiation
//! - Input schema validation
//!
//! # Wire Format
//!
//! Messages are JSON objects. The stdio transport frames them as
//! newline-delimited JSON; the HTTP transports carry one message per POST
//! body or per SSE event.

#![forbid(unsafe_code)]

mod jsonrpc;
mod messages;
pub mod schema;
mod types;

pub use jsonrpc::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId,
};
pub use messages::*;
pub use rapormcp_core::LoggingLevel;
pub use schema::{ValidationIssue, ValidationResult, validate};
pub use types::*;
