//! `rapor-mcp`: serves the grade-book tools over stdio, SSE or streamable
//! HTTP.
//!
//! Logs go to stderr so stdout stays free for the stdio transport. The
//! filter comes from `RAPORMCP_LOG`, then `RUST_LOG`, then `info`.

#![forbid(unsafe_code)]

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use rapormcp_grades::{DEFAULT_API_URL, GradesApi, HttpGradesClient, register};
use rapormcp_server::{
    BearerTokenAuthProvider, DEFAULT_HOST, DEFAULT_PORT, LoggingConfig, Server, TransportConfig,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Grade-book MCP server.
#[derive(Debug, Parser)]
#[command(name = "rapor-mcp")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Transport to serve on.
    #[arg(long, short = 't', value_enum, default_value_t = Mode::Stdio)]
    transport: Mode,

    /// Listen address for the HTTP transports.
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Listen port for the HTTP transports.
    #[arg(long, short = 'p', default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Base URL of the rapor CRUD backend.
    #[arg(long, env = "RAPOR_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Bearer token HTTP clients must present. Unset means no auth.
    #[arg(long, env = "RAPOR_MCP_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Stdio,
    Sse,
    Http,
}

fn init_tracing() {
    let config = LoggingConfig::from_env();
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let api: Arc<dyn GradesApi> = match HttpGradesClient::new(&cli.api_url) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!("Failed to create backend client: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut builder = register(Server::new("rapor-mcp", env!("CARGO_PKG_VERSION")), api)
        .instructions("Kelola mata pelajaran dan nilai siswa melalui backend rapor.");
    if let Some(token) = cli.token.clone() {
        if cli.transport == Mode::Stdio {
            info!("Ignoring --token: stdio has no HTTP authentication");
        } else {
            builder = builder.auth_provider(BearerTokenAuthProvider::new(token, "rapor-client"));
        }
    }
    let server = builder.build();

    let config = match cli.transport {
        Mode::Stdio => TransportConfig::Stdio,
        Mode::Sse => TransportConfig::sse(cli.host.clone(), cli.port),
        Mode::Http => TransportConfig::http_stream(cli.host.clone(), cli.port),
    };
    info!("Backend: {}", cli.api_url);

    match server.start(config).await {
        Ok(None) => {
            // Stdio: run until the client hangs up.
            for session in server.sessions() {
                session.closed().await;
            }
        }
        Ok(Some(address)) => {
            info!("Listening on http://{}", address);
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to wait for Ctrl-C: {}", err);
            }
            server.stop().await;
        }
        Err(err) => {
            error!("Failed to start: {}", err);
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}
