//! Daemon entry point for the switchboard MCP server.
//!
//! Loads `.env` and configuration from the environment, connects every backend
//! once, and serves the MCP protocol over stdio or streamable HTTP.
//!
//! Logs go to stderr so stdout stays reserved for the stdio protocol.
//! `RUST_LOG` controls verbosity (default: `info` for the switchboard crates).

mod config;

use std::sync::Arc;

use switchboard_core::Gateway;
use switchboard_mcp::server::{serve_stdio, serve_streamable_http};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{SwitchboardConfig, Transport};

const DEFAULT_LOG_FILTER: &str = "switchboard_mcpd=info,switchboard_mcp=info,switchboard_core=info";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let dotenv = dotenvy::dotenv();
    init_tracing();
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    let config = SwitchboardConfig::from_args()?;
    let (gateway, report) = Gateway::connect(&config.gateway).await;
    for entry in report.entries() {
        if entry.ok {
            info!(backend = %entry.backend, detail = %entry.detail, "backend ready");
        } else {
            warn!(backend = %entry.backend, detail = %entry.detail, "backend unavailable; its tools will report errors");
        }
    }

    let gateway = Arc::new(gateway);
    match config.transport {
        Transport::Stdio => serve_stdio(gateway).await,
        Transport::Http => serve_streamable_http(gateway, config.http_server_config()).await,
    }
}
