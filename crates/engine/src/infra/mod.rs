//! Infrastructure layer - database connection and dynamic statements.

pub mod db;
pub(crate) mod store;

pub use db::Database;
