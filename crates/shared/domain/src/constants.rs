//! Domain-level constants.

/// Column holding the soft-delete timestamp when an entity does not override it
pub const DEFAULT_DESTROYED_AT_COLUMN: &str = "destroyed_at";

/// Primary key column used when an entity does not override it
pub const DEFAULT_PRIMARY_KEY: &str = "id";
