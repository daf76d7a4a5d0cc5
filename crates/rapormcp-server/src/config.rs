//! Session, transport and logging configuration.

use std::time::Duration;

use rapormcp_core::logging::Level;

/// Per-session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub handshake: HandshakeConfig,
    pub ping: PingConfig,
    pub roots: RootsConfig,
    /// Deadline for server-initiated requests such as `roots/list`.
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            ping: PingConfig::default(),
            roots: RootsConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// How long `connect` waits for the client's `initialize`.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Liveness probing.
#[derive(Debug, Clone)]
pub struct PingConfig {
    /// Overrides the transport default (on for SSE and HTTP streaming, off
    /// otherwise).
    pub enabled: Option<bool>,
    pub interval: Duration,
    /// Level failed probes are logged at.
    pub log_level: Level,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            interval: Duration::from_millis(5000),
            log_level: Level::Debug,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RootsConfig {
    /// Fetch the client's roots after the handshake when it supports them.
    pub enabled: bool,
}

impl Default for RootsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Where [`Server::start`](crate::Server::start) listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// One session over the process's stdin/stdout.
    Stdio,
    /// Long-lived event stream plus a POST endpoint for client messages.
    Sse {
        host: String,
        port: u16,
        endpoint: String,
        message_endpoint: String,
    },
    /// Streamable HTTP on a single endpoint.
    HttpStream {
        host: String,
        port: u16,
        endpoint: String,
    },
}

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

impl TransportConfig {
    /// SSE with the default paths.
    #[must_use]
    pub fn sse(host: impl Into<String>, port: u16) -> Self {
        Self::Sse {
            host: host.into(),
            port,
            endpoint: "/sse".to_string(),
            message_endpoint: "/messages".to_string(),
        }
    }

    /// HTTP streaming with the default path.
    #[must_use]
    pub fn http_stream(host: impl Into<String>, port: u16) -> Self {
        Self::HttpStream {
            host: host.into(),
            port,
            endpoint: "/mcp".to_string(),
        }
    }

    /// `host:port` for the HTTP flavors.
    #[must_use]
    pub fn bind_address(&self) -> Option<String> {
        match self {
            Self::Stdio => None,
            Self::Sse { host, port, .. } | Self::HttpStream { host, port, .. } => {
                Some(format!("{host}:{port}"))
            }
        }
    }
}

/// Host-side logging filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// An `env_logger`-style directive string, e.g. `info,rapormcp::session=debug`.
    pub filter: String,
}

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "RAPORMCP_LOG";

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Reads `RAPORMCP_LOG`, falling back to `RUST_LOG` and then `info`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let set = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        set(LOG_ENV)
            .or_else(|| set("RUST_LOG"))
            .map(|filter| Self { filter })
            .unwrap_or_default()
    }
}
