//! Entity operations over a single database connection. Handlers, CSV import
//! and maintenance commands all go through these so the invariants are
//! enforced in one place.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

use crate::error::AppError;
use crate::validation::ValidationError;

pub mod applications;
pub mod companies;
pub mod postings;
pub mod users;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InUse(String),
    #[error("database error: {0}")]
    Database(#[from] DieselError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Maps a unique-constraint violation to a conflict carrying `message`;
    /// every other error passes through unchanged.
    pub(crate) fn on_unique_violation(err: DieselError, message: impl Into<String>) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                StoreError::Conflict(message.into())
            }
            other => StoreError::Database(other),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Validation(err) => AppError::from(err),
            StoreError::Conflict(message) | StoreError::InUse(message) => {
                AppError::bad_request(message)
            }
            StoreError::Database(err) => AppError::from(err),
        }
    }
}
