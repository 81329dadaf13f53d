use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use guildhall_server::config::ServerConfig;
use guildhall_server::db::pool::{create_pool, run_migrations};
use guildhall_server::engine::chat_engine::ChatEngine;
use guildhall_server::engine::notifier::{Notifier, persist_notices};
use guildhall_server::engine::policy::AccessPolicy;
use guildhall_server::web::app_state::AppState;
use guildhall_server::web::router::build_router;

#[derive(Parser)]
#[command(name = "guildhall-server", about = "Group chat server with tiered permissions")]
struct Cli {
    /// Path to the TOML config file. Missing files fall back to defaults.
    #[arg(short, long, default_value = "guildhall.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load(&cli.config)?;

    // Unknown capability names in the delete bundles are fatal
    let policy = AccessPolicy::from_config(&config.policy).context("invalid [policy] section")?;

    let pool = create_pool(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to database")?;
    run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;

    let (notifier, notices) = Notifier::new();
    tokio::spawn(persist_notices(pool.clone(), notices));

    let engine = ChatEngine::new(pool, policy, config.provisioning.clone(), notifier);
    let app = build_router(Arc::new(AppState { engine }));

    info!("Guildhall server starting on {}", config.server.web_address);

    let listener = tokio::net::TcpListener::bind(&config.server.web_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.web_address))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
