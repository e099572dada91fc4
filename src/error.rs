//! Error types for the user store

use thiserror::Error;

/// Failures surfaced by the storage layer.
///
/// The two sentinel variants carry the offending identifier so the HTTP
/// boundary can echo it back to the caller; anything else is a generic
/// storage fault whose detail stays in the operator log.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("user with id {0} already exists")]
    UserExists(i64),

    #[error("no user with id {0}")]
    UserNotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
