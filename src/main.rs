use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cms_api_rust::config::{self, AppConfig};
use cms_api_rust::database::models::EntityRegistry;
use cms_api_rust::database::DatabaseManager;
use cms_api_rust::{app, is_production, AppState};

#[derive(Parser)]
#[command(name = "cms-api")]
#[command(about = "Content-management API backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Port to listen on, overrides PORT")]
        port: Option<u16>,
    },

    #[command(about = "Print the field metadata exposure of a registered model")]
    Describe {
        #[arg(help = "Model name, e.g. User or ContactUs")]
        model: String,
    },
}

fn registry(config: &AppConfig) -> EntityRegistry {
    EntityRegistry::standard().strict_member_schema(config.metadata.strict_member_schema)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL, JWT_SECRET etc. are picked up
    let _ = dotenvy::dotenv();

    let config = config::config();
    let default_filter = if config.api.enable_request_logging { "info,tower_http=debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    match Cli::parse().command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve(config, port).await,
        Commands::Describe { model } => {
            let description = registry(config).describe(&model)?;
            println!("{}", serde_json::to_string_pretty(&description)?);
            Ok(())
        }
    }
}

async fn serve(config: &'static AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    tracing::info!("Starting CMS API in {:?} mode", config.environment);
    if is_production!() && (config.security.jwt_secret.is_empty() || config.security.jwt_refresh_secret.is_empty()) {
        bail!("JWT_SECRET and JWT_REFRESH_SECRET must be set in production");
    }

    let registry = Arc::new(registry(config));
    let store = DatabaseManager::connect(&config.database, &registry).await.context("failed to connect store")?;
    let state = AppState::new(store, registry, config);

    let bind_addr = format!("0.0.0.0:{}", port.unwrap_or(config.api.port));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("CMS API listening on http://{}", bind_addr);
    axum::serve(listener, app(state, &config.security)).await?;
    Ok(())
}
