//! Domain-level errors.
//!
//! These errors represent schema violations and malformed identifiers.
//! They are independent of infrastructure concerns (HTTP, database).

use thiserror::Error;

/// Domain-specific errors for schema and identifier violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Schema declaration is inconsistent
    #[error("Invalid schema: {0}")]
    Schema(String),

    /// Entity type is not registered
    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    /// Association is not declared on the entity type
    #[error("Unknown association {association} on {entity}")]
    UnknownAssociation { entity: String, association: String },

    /// Record identifier could not be parsed for the entity's key kind
    #[error("Invalid record id: {0}")]
    InvalidId(String),

    /// Entity type already registered (conflict)
    #[error("{0} already exists")]
    Conflict(String),
}

impl DomainError {
    /// Create a schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        DomainError::Schema(msg.into())
    }

    /// Create an unknown entity error
    pub fn unknown_entity(entity: impl Into<String>) -> Self {
        DomainError::UnknownEntity(entity.into())
    }

    /// Create an unknown association error
    pub fn unknown_association(entity: impl Into<String>, association: impl Into<String>) -> Self {
        DomainError::UnknownAssociation {
            entity: entity.into(),
            association: association.into(),
        }
    }

    /// Create an invalid id error
    pub fn invalid_id(raw: impl Into<String>) -> Self {
        DomainError::InvalidId(raw.into())
    }

    /// Create a conflict error
    pub fn conflict(entity: impl Into<String>) -> Self {
        DomainError::Conflict(entity.into())
    }
}

/// Result type alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
