//! Database-specific error types and conversions.

use campusgate_core::error::CampusError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),
}

impl From<DbError> for CampusError {
    fn from(err: DbError) -> Self {
        CampusError::Database(err.to_string())
    }
}
