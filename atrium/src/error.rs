//! Host error types.

use atrium_api::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("guest fault: {0}")]
    Fault(String),

    #[error("app not found: {0}")]
    AppNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("package error: {0}")]
    Package(String),

    #[error("download error: {0}")]
    Download(String),

    #[error("stopped")]
    Stopped,

    #[error("audio device error: {0}")]
    Audio(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for HostError {
    fn from(e: reqwest::Error) -> Self {
        HostError::Download(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HostError>;
