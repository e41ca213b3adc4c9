//! Gateway configuration.

use std::env;
use std::path::PathBuf;

use common::{DatabaseConfig, EngineConfig};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JSON document describing the entity types to serve
    pub schema_path: PathBuf,
    /// Optional SQL script run once at startup, e.g. to create tables
    pub init_sql_path: Option<PathBuf>,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("GATEWAY_HOST").unwrap_or(defaults.host),
            port: env::var("GATEWAY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            schema_path: env::var("SCHEMA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.schema_path),
            init_sql_path: env::var("DATABASE_INIT_SQL").ok().map(PathBuf::from),
            database: DatabaseConfig::from_env(),
            engine: EngineConfig::from_env(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            schema_path: PathBuf::from("schema.json"),
            init_sql_path: None,
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}
