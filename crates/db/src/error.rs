//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A JSON column could not be (de)serialised.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A text column held a value outside its enum.
    #[error("decode error: {0}")]
    Decode(String),
}
