//! HTTP gateway for the soft-delete engine.
//!
//! Serves every entity type of a JSON schema document as a REST resource,
//! with a `restore` action for the soft-deletable ones.

pub mod config;
pub mod handlers;
pub mod routes;
pub mod state;

use std::error::Error;
use std::net::SocketAddr;

use domain::SchemaConfig;
use engine::{Database, Engine, Registry};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::GatewayConfig;
use crate::routes::create_router;
use crate::state::AppState;

/// Load the schema, connect to the database and build the engine.
pub async fn build_state(config: &GatewayConfig) -> Result<AppState, Box<dyn Error>> {
    let raw = tokio::fs::read_to_string(&config.schema_path).await?;
    let schema: SchemaConfig = serde_json::from_str(&raw)?;
    let registry = Registry::from_schema(schema, &config.engine)?;
    info!(
        schema = %config.schema_path.display(),
        entities = registry.len(),
        "Schema loaded"
    );

    let database = Database::connect(&config.database).await?;
    if let Some(path) = &config.init_sql_path {
        let sql = tokio::fs::read_to_string(path).await?;
        database.execute_script(&sql).await?;
        info!(script = %path.display(), "Database initialized");
    }

    Ok(AppState::new(
        Engine::new(registry, config.engine.clone()),
        database,
    ))
}

/// Run the HTTP server with the given configuration.
pub async fn run_server_with_config(config: GatewayConfig) -> Result<(), Box<dyn Error>> {
    let state = build_state(&config).await?;

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
