//! Unified error handling for the engine and the HTTP layer.
//!
//! Provides a single error type that is returned by every engine operation
//! and converts into an Axum HTTP response at the edge.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::DomainError;
use serde::Serialize;
use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    // Resource errors
    #[error("Resource not found")]
    NotFound,

    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("{0} already exists")]
    Conflict(String),

    // Validation
    #[error("{0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    BadRequest(String),

    // Soft delete
    #[error("{event} on {entity} was aborted by a callback")]
    AbortedByCallback { entity: String, event: String },

    #[error("{entity} {id} was modified concurrently")]
    ConcurrentModification { entity: String, id: String },

    #[error("Association {association} on {entity} cannot be resolved: {reason}")]
    UnresolvableAssociation {
        entity: String,
        association: String,
        reason: String,
    },

    // External service errors
    #[cfg(feature = "database")]
    #[error("Database error")]
    Database(#[from] sea_orm::DbErr),

    // Internal
    #[error("Internal server error")]
    Internal(String),
}

/// Error response body for HTTP
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl AppError {
    /// Get error code for client
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound => "NOT_FOUND",
            AppError::UnknownEntity(_) => "UNKNOWN_ENTITY",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::AbortedByCallback { .. } => "ABORTED_BY_CALLBACK",
            AppError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            AppError::UnresolvableAssociation { .. } => "UNRESOLVABLE_ASSOCIATION",
            #[cfg(feature = "database")]
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound | AppError::UnknownEntity(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::ConcurrentModification { .. } => StatusCode::CONFLICT,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AbortedByCallback { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get user-facing message (hides internal details)
    pub fn user_message(&self) -> String {
        match self {
            // Show full message for client errors
            AppError::Validation(msg) => msg.clone(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Conflict(msg) => {
                if msg.ends_with("already exists") {
                    msg.clone()
                } else {
                    format!("{} already exists", msg)
                }
            }

            // Hide details for internal errors
            #[cfg(feature = "database")]
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "A database error occurred".to_string()
            }
            AppError::UnresolvableAssociation { .. } => {
                tracing::error!("{}", self);
                "An internal error occurred".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }

            // Use default message for others
            _ => self.to_string(),
        }
    }

    /// Whether the operation was refused rather than broken.
    ///
    /// Refusals leave storage untouched and are reported as a failed
    /// operation instead of a crash.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            AppError::AbortedByCallback { .. } | AppError::ConcurrentModification { .. }
        )
    }
}

// =============================================================================
// HTTP Response (Axum)
// =============================================================================

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.user_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Domain Error Conversion
// =============================================================================

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::UnknownEntity(name) => AppError::UnknownEntity(name),
            DomainError::InvalidId(raw) => AppError::BadRequest(format!("invalid id {}", raw)),
            DomainError::Conflict(msg) => AppError::Conflict(msg),
            err @ (DomainError::Schema(_) | DomainError::UnknownAssociation { .. }) => {
                AppError::Validation(err.to_string())
            }
        }
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Extension trait for Option -> AppError conversion
pub trait OptionExt<T> {
    fn ok_or_not_found(self) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self) -> AppResult<T> {
        self.ok_or(AppError::NotFound)
    }
}

/// Convenience constructors
impl AppError {
    pub fn conflict(entity: impl Into<String>) -> Self {
        AppError::Conflict(entity.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    pub fn aborted(entity: impl Into<String>, event: impl Into<String>) -> Self {
        AppError::AbortedByCallback {
            entity: entity.into(),
            event: event.into(),
        }
    }

    pub fn concurrent(entity: impl Into<String>, id: impl ToString) -> Self {
        AppError::ConcurrentModification {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn unresolvable(
        entity: impl Into<String>,
        association: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        AppError::UnresolvableAssociation {
            entity: entity.into(),
            association: association.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_delete_errors_map_to_statuses() {
        assert_eq!(AppError::aborted("Post", "destroy").status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::concurrent("Post", 1).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::unresolvable("Like", "likeable", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::UnknownEntity("Nope".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn refusals_are_distinguished_from_failures() {
        assert!(AppError::aborted("Post", "destroy").is_refusal());
        assert!(AppError::concurrent("Post", 1).is_refusal());
        assert!(!AppError::internal("boom").is_refusal());
    }

    #[test]
    fn domain_errors_convert() {
        assert!(matches!(
            AppError::from(DomainError::unknown_entity("Ghost")),
            AppError::UnknownEntity(name) if name == "Ghost"
        ));
        assert!(matches!(
            AppError::from(DomainError::invalid_id("x")),
            AppError::BadRequest(_)
        ));
        assert!(matches!(
            AppError::from(DomainError::schema("bad")),
            AppError::Validation(_)
        ));
    }

    #[test]
    fn unresolvable_association_hides_details() {
        let err = AppError::unresolvable("Like", "likeable", "unknown type Ghost");
        assert_eq!(err.user_message(), "An internal error occurred");
    }
}
