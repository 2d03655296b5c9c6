//! Transport error types

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the connection lifecycle. Each one ends the current attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {addr} failed: {message}")]
    Connect { addr: String, message: String },

    #[error("timed out connecting to {addr}")]
    Timeout { addr: String },

    #[error("failed to load key {}: {message}", path.display())]
    KeyLoad { path: PathBuf, message: String },

    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("channel error: {message}")]
    Channel { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("no active channel")]
    NoChannel,
}

impl TransportError {
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }
}

impl From<russh::Error> for TransportError {
    fn from(e: russh::Error) -> Self {
        Self::Channel {
            message: e.to_string(),
        }
    }
}
