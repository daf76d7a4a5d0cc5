//! MCP error type and JSON-RPC error codes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result alias used throughout rapormcp.
pub type McpResult<T> = Result<T, McpError>;

/// Stable JSON-RPC error codes used by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McpErrorCode {
    /// Invalid JSON was received (-32700).
    ParseError,
    /// The JSON sent is not a valid request (-32600).
    InvalidRequest,
    /// The method or target does not exist (-32601).
    MethodNotFound,
    /// Invalid method parameters (-32602).
    InvalidParams,
    /// Internal error (-32603).
    InternalError,
    /// A server-initiated request received no answer in time (-32001).
    RequestTimeout,
    /// Any other code, typically received from a peer.
    Custom(i32),
}

impl From<McpErrorCode> for i32 {
    fn from(code: McpErrorCode) -> Self {
        match code {
            McpErrorCode::ParseError => -32700,
            McpErrorCode::InvalidRequest => -32600,
            McpErrorCode::MethodNotFound => -32601,
            McpErrorCode::InvalidParams => -32602,
            McpErrorCode::InternalError => -32603,
            McpErrorCode::RequestTimeout => -32001,
            McpErrorCode::Custom(code) => code,
        }
    }
}

impl From<i32> for McpErrorCode {
    fn from(code: i32) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -32001 => Self::RequestTimeout,
            other => Self::Custom(other),
        }
    }
}

impl Serialize for McpErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32((*self).into())
    }
}

impl<'de> Deserialize<'de> for McpErrorCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i32::deserialize(deserializer).map(Self::from)
    }
}

/// A protocol-level error returned to the client as a JSON-RPC error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code:?})")]
pub struct McpError {
    /// Error code.
    pub code: McpErrorCode,
    /// Human readable message.
    pub message: String,
    /// Structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    /// Creates an error with the given code and message.
    #[must_use]
    pub fn new(code: McpErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches structured data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Invalid JSON was received.
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::ParseError, message)
    }

    /// Malformed request or a missing required argument.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::InvalidRequest, message)
    }

    /// Unknown method, tool, resource or prompt.
    #[must_use]
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::MethodNotFound, message)
    }

    /// Parameters failed to parse or validate.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::InvalidParams, message)
    }

    /// Unexpected failure inside the server.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::InternalError, message)
    }

    /// The request cannot be served in the current state, e.g. completion
    /// against an entry that does not support it.
    #[must_use]
    pub fn unexpected_state(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::InternalError, message)
    }

    /// A server-initiated request timed out.
    #[must_use]
    pub fn request_timeout(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::RequestTimeout, message)
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_params(err.to_string())
    }
}
