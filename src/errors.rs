use thiserror::Error;

/// Display strings lead with a stable code that clients can branch on.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("VALIDATION: {0}")]
    Validation(String),
    #[error("UNAUTHENTICATED: {0}")]
    Unauthenticated(String),
    #[error("POLICY_DENIED: {0}")]
    Policy(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("STORAGE_FAILURE: {0}")]
    Storage(String),
    #[error("INVALID_IMPORT: {0}")]
    InvalidImport(String),
    #[error("DATABASE_FAILURE: {0}")]
    Database(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Database(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(format!("json: {}", value))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
