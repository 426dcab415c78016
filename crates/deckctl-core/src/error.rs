//! Error types for deckctl.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport failures, protocol anomalies
//! that must reach the caller, and per-command device failures are all
//! captured here.

/// The error type for all deckctl operations.
///
/// Parse anomalies inside a status block are never surfaced through this
/// type: the offending line is logged and skipped. Only failures that a
/// specific caller must react to become an `Error`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (address resolution, connect, socket write).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error the caller needs to see.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The device answered a confirmable command with a non-2xx code.
    ///
    /// `message` is the device's own text, e.g. `"clip in use"`.
    #[error("command failed ({code}): {message}")]
    CommandFailed {
        /// Three-digit response code from the header line.
        code: u16,
        /// Message text following the code.
        message: String,
    },

    /// Timed out waiting for a connection or a caller-layered deadline.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to a command or builder.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the device has been established, or it was closed.
    #[error("not connected")]
    NotConnected,

    /// The connection to the device was lost while work was outstanding.
    #[error("connection lost")]
    ConnectionLost,

    /// The connection was closed locally while the command was pending.
    #[error("connection closed")]
    Closed,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The device's message text, if this is a [`Error::CommandFailed`].
    pub fn device_message(&self) -> Option<&str> {
        match self {
            Error::CommandFailed { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Whether this error means the connection itself is gone.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::ConnectionLost | Error::NotConnected | Error::Io(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
