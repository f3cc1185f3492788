use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use switchboard::config::{self, DEFAULT_CONFIG_FILE};
use switchboard::{AppState, build_router, client};
use tracing::info;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Support chat switchboard pairing customers with agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chat server in the foreground
    Server(ServerArgs),

    /// Join a chat from the terminal
    Connect(ConnectArgs),
}

#[derive(Parser)]
struct ServerArgs {
    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to the TOML config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Parser)]
struct ConnectArgs {
    /// Display name (prompted for when omitted)
    #[arg(short, long)]
    name: Option<String>,

    /// Join as a support agent
    #[arg(short, long)]
    agent: bool,

    /// Server WebSocket URL
    #[arg(short, long, default_value = client::DEFAULT_URL)]
    url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => run_server(args).await,
        Commands::Connect(args) => {
            client::run(client::ConnectOptions {
                url: args.url,
                name: args.name,
                agent: args.agent,
            })
            .await
        }
    }
}

async fn run_server(args: ServerArgs) -> Result<()> {
    // Setup logging
    let default_directive = if args.debug {
        "switchboard=debug,switchboard_core=debug,tower_http=debug,info"
    } else {
        "switchboard=info,switchboard_core=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting switchboard");

    let mut file_config = config::resolve(&args.config)?;
    if let Some(host) = args.host {
        file_config.server.host = host;
    }
    if let Some(port) = args.port {
        file_config.server.port = port;
    }

    let state = AppState::start(&file_config.coordinator);
    let coordinator = state.coordinator().clone();
    let app = build_router(state);

    let addr = file_config.server.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let actual_addr = listener.local_addr()?;

    info!("Switchboard listening on http://{}", actual_addr);
    info!("  GET /connect      - WebSocket chat endpoint (headers: Name, Type)");
    info!("  GET /health       - Health summary");
    info!("  GET /metrics      - Connection and routing counters");
    info!("  GET /api/status   - Queue and pairing table");

    // Create shutdown signal handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    coordinator.shutdown();
    info!("Shutdown complete");
    server_result
}
