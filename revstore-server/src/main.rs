use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};

use revstore_core::{Config, Database, ObjectStore};
use revstore_server::{router, AppState};

#[derive(Parser, Debug)]
#[command(name = "revstore-server", about = "Multi-tenant revisioned JSON object store")]
struct Args {
    /// Path to a TOML config file (default: XDG config dir)
    #[arg(long, env = "REVSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Database file path (overrides config)
    #[arg(long, env = "REVSTORE_DB")]
    database: Option<PathBuf>,

    /// Listen host (overrides config)
    #[arg(long, env = "REVSTORE_HOST")]
    host: Option<String>,

    /// Listen port (overrides config)
    #[arg(long, env = "REVSTORE_PORT")]
    port: Option<u16>,

    /// Client credentials (format: "client:token,client2:token2"; overrides config)
    #[arg(long, env = "REVSTORE_AUTH")]
    auth: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(database) = args.database {
        config.database.path = database;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let _guard = revstore_core::logging::init(&config.logging)?;

    let auth = match &args.auth {
        Some(credentials) => parse_credentials(credentials),
        None => config.auth.clients.clone(),
    };
    if auth.is_empty() {
        warn!("No client credentials configured; every request will be rejected");
        warn!("Provide credentials via [auth.clients] in the config file, or");
        warn!("REVSTORE_AUTH in the format 'client:token,client2:token2'");
    }

    info!(path = %config.database.path.display(), "Opening database");
    let db = Database::open(&config.database)?;
    let store = ObjectStore::new(db);

    let app = router(AppState::new(store, auth));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(%addr, "revstore listening");
    info!("Object store API available under /svc/v1");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Parse a "client:token,client2:token2" credential string.
fn parse_credentials(input: &str) -> HashMap<String, String> {
    input
        .split(',')
        .enumerate()
        .filter_map(|(i, entry)| {
            if entry.is_empty() {
                return None;
            }
            let result = entry
                .split_once(':')
                .map(|(id, token)| (id.to_string(), token.to_string()));
            if result.is_none() {
                warn!("Found invalid credential {}. Skipping...", i);
            }
            result
        })
        .collect()
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}
