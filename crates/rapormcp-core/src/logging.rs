//! Logging for rapormcp.
//!
//! Two kinds of logging meet here:
//!
//! - **Process logging** goes through the standard [`log`] facade. The
//!   framework does not install a logger; the binary wires the facade into
//!   `tracing-subscriber`.
//! - **Client logging** is the protocol's `notifications/message` stream.
//!   Its severity scale is [`LoggingLevel`] and each session keeps its
//!   current threshold in a [`SharedLevel`].
//!
//! # Log Targets
//!
//! - `rapormcp`: root target
//! - `rapormcp::server`: façade lifecycle
//! - `rapormcp::session`: handshake, dispatch and teardown
//! - `rapormcp::transport`: channel I/O
//! - `rapormcp::router`: registry lookups
//! - `rapormcp::handler`: handler execution
//! - `rapormcp::http`: HTTP listener
//! - `rapormcp::codec`: NDJSON framing
//!
//! Example filter: `RAPORMCP_LOG=rapormcp::session=debug,rapormcp::http=trace`

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

// Re-export log macros for ergonomic use
pub use log::{debug, error, info, trace, warn};

// Re-export log level types for programmatic use
pub use log::{Level, LevelFilter};

/// Log targets used by rapormcp components.
pub mod targets {
    /// Root target for all rapormcp logs.
    pub const RAPORMCP: &str = "rapormcp";

    /// Server façade lifecycle.
    pub const SERVER: &str = "rapormcp::server";

    /// Per-client protocol sessions.
    pub const SESSION: &str = "rapormcp::session";

    /// Transport layer (stdio, in-memory).
    pub const TRANSPORT: &str = "rapormcp::transport";

    /// Registry lookups and method routing.
    pub const ROUTER: &str = "rapormcp::router";

    /// Tool, resource, and prompt handler execution.
    pub const HANDLER: &str = "rapormcp::handler";

    /// HTTP listener (SSE and streamable HTTP).
    pub const HTTP: &str = "rapormcp::http";

    /// Codec operations (JSON encoding/decoding).
    pub const CODEC: &str = "rapormcp::codec";

    /// Grade-book backend client and tools.
    pub const GRADES: &str = "rapormcp::grades";
}

/// Client-visible log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    #[default]
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LoggingLevel {
    const ALL: [Self; 8] = [
        Self::Debug,
        Self::Info,
        Self::Notice,
        Self::Warning,
        Self::Error,
        Self::Critical,
        Self::Alert,
        Self::Emergency,
    ];

    /// Wire name of the level.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        }
    }

    fn from_index(index: u8) -> Self {
        Self::ALL
            .get(usize::from(index))
            .copied()
            .unwrap_or_default()
    }

    fn index(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for LoggingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoggingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown logging level: {s}"))
    }
}

/// A session's client logging threshold, shared between the session and
/// the contexts of its in-flight requests.
///
/// Reads always observe the latest completed write.
#[derive(Debug, Clone, Default)]
pub struct SharedLevel(Arc<AtomicU8>);

impl SharedLevel {
    /// Creates a threshold starting at `level`.
    #[must_use]
    pub fn new(level: LoggingLevel) -> Self {
        Self(Arc::new(AtomicU8::new(level.index())))
    }

    /// Current threshold.
    #[must_use]
    pub fn get(&self) -> LoggingLevel {
        LoggingLevel::from_index(self.0.load(Ordering::Acquire))
    }

    /// Replaces the threshold.
    pub fn set(&self, level: LoggingLevel) {
        self.0.store(level.index(), Ordering::Release);
    }

    /// Returns true if a message at `level` passes the threshold.
    #[must_use]
    pub fn allows(&self, level: LoggingLevel) -> bool {
        level >= self.get()
    }
}
