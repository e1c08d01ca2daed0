use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DimError {
    #[error("connectivity error: {message}")]
    Connectivity { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("invariant violation: {message}")]
    Invariant { message: String },
    #[error("source error: {message}")]
    Source { message: String },
}

impl DimError {
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    pub fn source(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Errors after which no further entity of the run can be processed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DimError::Connectivity { .. })
    }
}

pub type DimResult<T> = Result<T, DimError>;

impl From<DbErr> for DimError {
    fn from(value: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = value.sql_err() {
            return DimError::conflict(detail);
        }
        match value {
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => {
                DimError::connectivity(value.to_string())
            }
            other => DimError::storage(other.to_string()),
        }
    }
}
