//! Core types for rapormcp.
//!
//! This crate provides the building blocks shared by every other crate in
//! the workspace:
//! - [`McpError`] and the stable JSON-RPC error codes
//! - [`McpContext`], the per-request handle given to tool, resource and
//!   prompt handlers (client logging, progress, auth)
//! - [`AuthContext`] attached to a session by an authentication provider
//! - Log targets for the `log` facade
//!
//! All types are `Send + Sync` so handlers can run on any tokio worker.

#![forbid(unsafe_code)]

mod auth;
mod context;
mod error;
pub mod logging;

pub use auth::{AccessToken, AuthContext};
pub use context::{
    ClientLogger, McpContext, NoOpNotificationSender, NotificationSender, ProgressReporter,
};
pub use error::{McpError, McpErrorCode, McpResult};
pub use logging::{LoggingLevel, SharedLevel};
