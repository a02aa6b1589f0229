use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use catalog_api_rust::auth::{generate_jwt, Claims, Grant, ARCHIVE_ACTION};
use catalog_api_rust::catalog::{EntityStore, Fixture, MemoryStore, PgEntityStore};
use catalog_api_rust::config::{self, StoreBackend};
use catalog_api_rust::services::{UnarchiveOptions, UnarchiveService};
use catalog_api_rust::{app, AppState};

#[derive(Parser)]
#[command(name = "catalog-api")]
#[command(about = "Catalog API - restore archived products and their variants")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        #[arg(long, help = "Port to listen on (overrides API_PORT)")]
        port: Option<u16>,
        #[arg(long, value_enum, help = "Entity store backend (overrides DATABASE_BACKEND)")]
        backend: Option<StoreBackend>,
        #[arg(long, env = "CATALOG_FIXTURE", help = "YAML or JSON file used to seed the memory store")]
        fixture: Option<PathBuf>,
    },

    /// Mint a bearer token for local use
    Token {
        #[arg(long, default_value = "developer")]
        subject: String,
        #[arg(long, help = "Shop the grant applies to, or '*'")]
        shop: String,
        #[arg(long, default_value = "catalog:products:*")]
        resource: String,
        #[arg(long, value_delimiter = ',', default_value = ARCHIVE_ACTION)]
        actions: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SECURITY_JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve {
        port: None,
        backend: None,
        fixture: None,
    });

    match command {
        Command::Serve { port, backend, fixture } => serve(port, backend, fixture).await,
        Command::Token { subject, shop, resource, actions } => {
            let config = config::config();
            let claims = Claims::new(subject, vec![Grant::new(shop, resource, actions)], config.security.jwt_expiry_hours);
            let token = generate_jwt(&claims, &config.security.jwt_secret)?;
            println!("{}", token);
            Ok(())
        }
    }
}

async fn serve(port: Option<u16>, backend: Option<StoreBackend>, fixture: Option<PathBuf>) -> anyhow::Result<()> {
    // Initialize configuration (this loads the config singleton)
    let config = config::config();
    info!("Starting Catalog API in {:?} mode", config.environment);

    if config.security.jwt_secret.is_empty() {
        bail!("SECURITY_JWT_SECRET must be set outside development");
    }

    let store: Arc<dyn EntityStore> = match backend.unwrap_or(config.database.backend) {
        StoreBackend::Memory => {
            if catalog_api_rust::is_production!() {
                warn!("Running production with the in-memory store; changes are lost on restart");
            }
            let store = match fixture {
                Some(path) => Fixture::load(&path)
                    .with_context(|| format!("loading fixture {}", path.display()))?
                    .into_store(),
                None => MemoryStore::new(),
            };
            Arc::new(store)
        }
        StoreBackend::Postgres => {
            if fixture.is_some() {
                warn!("--fixture is ignored with the postgres backend");
            }
            Arc::new(PgEntityStore::connect(&config.database).await?)
        }
    };
    info!("Using {} entity store", store.backend_name());

    let service = UnarchiveService::new(store, UnarchiveOptions::from(config));
    let state = AppState::new(service, &config.security.jwt_secret);
    let app = app(state, &config.api);

    let port = port.unwrap_or(config.api.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("Catalog API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
