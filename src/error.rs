use thiserror::Error;

/// Represents errors that can occur in the pool and its connections.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("No available connection")]
    NoAvailableConnection,
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Value error: {0}")]
    Value(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Dispatch task failed: {0}")]
    Task(String),
}

impl serde::de::Error for DbError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        DbError::Value(msg.to_string())
    }
}

impl From<tokio::task::JoinError> for DbError {
    fn from(e: tokio::task::JoinError) -> Self {
        DbError::Task(e.to_string())
    }
}

#[cfg(feature = "mysql")]
impl From<mysql_async::Error> for DbError {
    fn from(e: mysql_async::Error) -> Self {
        DbError::Database(e.to_string())
    }
}
