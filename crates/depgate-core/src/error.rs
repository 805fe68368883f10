#![forbid(unsafe_code)]

use thiserror::Error;

/// Errors from posting work to a sequence.
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("sequence {sequence} is shut down")]
    Closed { sequence: u64 },

    #[error("failed to spawn sequence thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors from installing the global log subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("log subscriber already installed: {0}")]
    AlreadyInstalled(String),
}
