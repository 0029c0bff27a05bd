use sea_orm::error::{DbErr, SqlErr};
use serde::Serialize;

/// Error taxonomy shared by every service and primitive in the crate.
///
/// Primitives fail fast and let the ambient transaction roll back; there is
/// no partial-commit or compensating-action path. Callers surface these as
/// user-facing messages and must not swallow them into silent no-ops.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Operation attempted from a status that does not permit it.
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// Reservation or fulfillment exceeds available/reserved quantity,
    /// or a physical decrement would drive stock negative.
    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    /// Unique constraint violation, e.g. a duplicate order number.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Maps a unique-index violation to `Conflict` with the given message;
    /// every other database error passes through unchanged.
    pub fn conflict_on_unique(err: DbErr, message: impl FnOnce() -> String) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(message()),
            _ => ServiceError::DatabaseError(err),
        }
    }

    /// True when the error is safe to report verbatim to an end user.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::EventError(_) | Self::Other(_)
        )
    }
}
