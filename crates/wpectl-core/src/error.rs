use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("wallpaper engine binary `{0}` not found in PATH")]
    EngineNotFound(String),
    #[error("a library scan is already in progress")]
    ScanInProgress,
    #[error("a property listing is already in progress")]
    ListingInProgress,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("background task failed: {0}")]
    Task(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
