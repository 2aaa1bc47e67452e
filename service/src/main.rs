#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

use std::sync::Arc;

use chatwire_api::{
    app::build_router,
    config::Config,
    stream::{ChatProvider, ChatStreamClient, HttpChatProvider},
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chatwire-api", about = "ChatWire streaming chat server")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: String,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    // Load and validate configuration first (fail-fast)
    let config = Config::load_from(&args.config).map_err(|e| anyhow::anyhow!("{e}"))?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Init banner so container logs clearly show startup
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "chatwire-api starting up"
    );

    let primary: Arc<dyn ChatProvider> =
        Arc::new(HttpChatProvider::new(config.chat.primary.clone())?);
    let mut client = ChatStreamClient::new(primary, config.chat.reconnect.policy())
        .with_channel_capacity(config.chat.channel_capacity);
    if let Some(fallback) = &config.chat.fallback {
        tracing::info!(provider = %fallback.name, "Fallback provider configured");
        client = client.with_fallback(Arc::new(HttpChatProvider::new(fallback.clone())?));
    }

    let app = build_router(&config, client);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Starting server at http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
