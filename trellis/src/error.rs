//! Trellis error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrellisError {
    #[error("font error: {0}")]
    Font(String),

    #[error("image decode error: {0}")]
    Decode(String),

    #[error("layout settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("layout error: {0}")]
    Layout(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TrellisError>;
