use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("database migration error: {0}")]
    Migration(String),

    #[error("database query error: {0}")]
    Query(String),

    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("stored value is malformed: {0}")]
    Corrupt(String),
}
