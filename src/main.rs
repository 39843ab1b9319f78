//! WebSocket Broadcast Chat Hub - Entry Point
//!
//! Loads configuration, opens the history store, starts the Hub actor and
//! serves HTTP/WebSocket connections.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chat_hub::{http, Config, HistoryStore, Hub, SessionContext, SqliteHistory};

/// Broadcast chat hub over WebSocket
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML config file (defaults to ./chat_hub.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address override, e.g. 0.0.0.0:8080
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_hub=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_hub=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(bind) = &cli.bind {
        config.set_bind(bind)?;
    }

    let mut session = SessionContext::new(Hub::spawn());
    session.outbound_capacity = config.hub.outbound_capacity;
    session.replay_limit = config.history.replay_limit;

    if config.history.enabled {
        let store = if config.history.path.as_os_str() == ":memory:" {
            SqliteHistory::open_in_memory()?
        } else {
            SqliteHistory::open(&config.history.path)?
        };
        info!("History stored in {}", config.history.path.display());
        session = session.with_history(Arc::new(store) as Arc<dyn HistoryStore>);
    } else {
        warn!("History disabled");
    }

    info!("Hub actor started");

    let listener = TcpListener::bind(config.bind_addr()?).await?;
    let state = Arc::new(http::AppState::new(session, &config));
    http::serve(listener, http::router(state, &config)).await?;

    Ok(())
}
