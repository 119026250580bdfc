use thiserror::Error;

#[derive(Error, Debug)]
pub enum TablesplitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error (worker {worker}): {message}")]
    Connect { worker: usize, message: String },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, TablesplitError>;
