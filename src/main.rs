//! Compass local backend
//!
//! Serves the auth, table, procedure and realtime routes over SQLite so the
//! sync layer can run without the hosted backend.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use compass::config::Config;
use compass::db::{self, Repository};
use compass::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Compass local backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.api_key.is_none() {
        tracing::warn!("No API key configured (COMPASS_API_KEY). Requests are not checked!");
    }
    if !config.disabled_procedures.is_empty() {
        let mut names: Vec<&str> = config.disabled_procedures.iter().map(|p| p.name()).collect();
        names.sort_unstable();
        tracing::warn!("Procedures not installed: {}", names.join(", "));
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Repository::new(pool)
        .with_disabled_procedures(config.disabled_procedures.clone())
        .with_bcrypt_cost(config.bcrypt_cost);

    let state = AppState {
        repo: Arc::new(repo),
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
