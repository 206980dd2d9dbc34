//! Error types for spectrocal.

use std::io;
use thiserror::Error;

/// Result type for spectrocal operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for spectrocal operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the serial line.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Transport failure that did not originate from the OS (e.g. closed connection).
    #[error("Transport error: {0}")]
    Transport(String),

    /// An open or send exceeded the ceiling timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Command token cannot be sent as a single protocol line.
    #[error("Invalid command: {0:?}")]
    InvalidCommand(String),

    /// A bounded retry policy gave up on a command that kept answering with nothing.
    #[error("No usable response to {command} after {attempts} attempts")]
    IncompleteResponse {
        /// Command token that was retried.
        command: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The embedding application asked the current operation to stop.
    #[error("Interrupted")]
    Interrupted,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this is a failure of the underlying line (open, write or read).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Serial(_) | Self::Transport(_))
    }

    /// Whether the ceiling timeout fired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Errors after which an interrogation session is restarted from the top.
    pub fn is_session_recoverable(&self) -> bool {
        self.is_transport() || self.is_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let io = Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(io.is_transport());
        assert!(io.is_session_recoverable());

        let closed = Error::Transport("connection closed".into());
        assert!(closed.is_transport());
        assert!(!closed.is_timeout());
    }

    #[test]
    fn test_timeout_is_recoverable_but_not_transport() {
        let err = Error::Timeout("read".into());
        assert!(err.is_timeout());
        assert!(!err.is_transport());
        assert!(err.is_session_recoverable());
    }

    #[test]
    fn test_other_errors_are_not_recoverable() {
        assert!(!Error::Interrupted.is_session_recoverable());
        assert!(!Error::Config("bad".into()).is_session_recoverable());
        assert!(
            !Error::IncompleteResponse {
                command: "SER".into(),
                attempts: 3
            }
            .is_session_recoverable()
        );
    }
}
