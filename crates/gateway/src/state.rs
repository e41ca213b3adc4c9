//! Application state for dependency injection.

use engine::{Database, Engine};
use sea_orm::DatabaseConnection;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub database: Database,
}

impl AppState {
    /// Create new app state.
    pub fn new(engine: Engine, database: Database) -> Self {
        Self { engine, database }
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.database.connection()
    }
}
