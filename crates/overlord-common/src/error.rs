use thiserror::Error;

#[derive(Error, Debug)]
pub enum OverlordError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Script could not be resolved: {0}")]
    ScriptNotFound(String),

    #[error("Script execution error: {0}")]
    ScriptExecution(String),

    #[error("Worker failure: {0}")]
    Worker(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OverlordError>;
