//! Protocol errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    Closed,

    #[error("unknown opcode {0}")]
    UnknownOpcode(u64),

    #[error("opcode {opcode} expects {expected} arguments, got {got}")]
    ArgCount { opcode: u64, expected: usize, got: usize },

    #[error("opcode {opcode}: argument {index} has the wrong type")]
    ArgType { opcode: u64, index: usize },

    #[error("response check failed: sent {sent}, echoed {echoed}")]
    Mismatch { sent: u64, echoed: u64 },

    #[error("payload of {0} bytes exceeds the frame limit")]
    TooLarge(u64),

    #[error("io error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::Closed
        } else {
            ProtocolError::Io(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
