//! rapormcp: a Model Context Protocol server framework.
//!
//! One [`Server`] holds a registry of tools, resources, resource templates
//! and prompts; every connected client gets its own [`Session`] bound to a
//! [`Transport`]. Stdio, SSE and streamable HTTP are served uniformly.
//!
//! # Quick Start
//!
//! ```ignore
//! use rapormcp::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new("demo", "1.0.0")
//!         .tool(
//!             FunctionTool::new("echo", |_ctx, args| async move {
//!                 Ok(ToolOutput::text(args["text"].as_str().unwrap_or_default()))
//!             })
//!             .input_schema(json!({
//!                 "type": "object",
//!                 "properties": {"text": {"type": "string"}},
//!                 "required": ["text"]
//!             })),
//!         )
//!         .build();
//!     server.start(TransportConfig::Stdio).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Crates
//!
//! - [`core`]: errors, request context, auth and logging targets
//! - [`protocol`]: JSON-RPC and MCP wire types, input schema validation
//! - [`transport`]: the [`Transport`] trait with stdio and in-memory channels
//! - [`server`]: registry, sessions, façade and HTTP listener

#![forbid(unsafe_code)]

pub use rapormcp_core as core;
pub use rapormcp_protocol as protocol;
pub use rapormcp_server as server;
pub use rapormcp_transport as transport;

pub use rapormcp_core::{
    AccessToken, AuthContext, ClientLogger, LoggingLevel, McpContext, McpError, McpErrorCode,
    McpResult,
};
pub use rapormcp_protocol::{
    CallToolResult, ClientCapabilities, Completion, Content, Prompt, Resource, ResourceContent,
    ResourceTemplate, Root, ServerCapabilities, ServerInfo, Tool, ToolAnnotations,
};
pub use rapormcp_server::{
    AllowAllAuthProvider, AuthProvider, AuthRejection, AuthRequest, BearerTokenAuthProvider,
    FunctionPrompt, FunctionResource, FunctionResourceTemplate, FunctionTool, PromptArgumentSpec,
    PromptHandler, ResourceData, ResourceHandler, ResourceOutput, ResourceTemplateHandler, Server,
    ServerBuilder, ServerError, ServerEvent, Session, SessionConfig, SessionError, SessionEvent,
    ToolError, ToolHandler, ToolOutput, TransportConfig, completer,
};
pub use rapormcp_transport::{MemoryTransport, StdioTransport, Transport, TransportError};

/// Everything a server author usually needs.
pub mod prelude {
    pub use crate::{
        AuthContext, Content, FunctionPrompt, FunctionResource, FunctionResourceTemplate,
        FunctionTool, McpContext, McpError, McpResult, PromptArgumentSpec, ResourceData,
        ResourceOutput, Server, ServerEvent, SessionConfig, ToolError, ToolOutput,
        TransportConfig, completer,
    };
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
}
