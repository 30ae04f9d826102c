//! Error types for zero-mysqlx.

use thiserror::Error;

use crate::diagnostics::Severity;

/// Result type for zero-mysqlx operations.
pub type Result<T> = core::result::Result<T, Error>;

/// An error reported by the server (`Mysqlx.Error`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Error severity. Only `Severity::Error` aborts a statement.
    pub severity: Severity,
    /// MySQL error code
    pub code: u32,
    /// SQLSTATE (5 characters)
    pub sql_state: String,
    /// Human-readable message
    pub message: String,
}

impl ServerError {
    /// Create an error with `Severity::Error`.
    pub fn new(code: u32, sql_state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            sql_state: sql_state.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error aborts the statement it was reported for.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (code {}, SQLSTATE {})",
            self.severity, self.message, self.code, self.sql_state
        )
    }
}

/// Error type for zero-mysqlx.
#[derive(Debug, Error)]
pub enum Error {
    /// Server error response
    #[error("MySQL error: {0}")]
    Server(ServerError),

    /// Protocol error (malformed frame, unexpected message, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A previous statement holds result sets that were neither read nor discarded
    #[error("Reply blocked by a previous one")]
    ReplyBlocked,

    /// Operation is not valid in the statement's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A state the state machine should never reach
    #[error("Internal error: {0}")]
    Internal(String),

    /// Invalid usage (e.g., malformed connection options)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// The owning session was closed or dropped
    #[error("Session is closed")]
    SessionClosed,

    /// The in-flight operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Returns true if the error leaves the wire in an unknown position.
    ///
    /// A session that saw such an error cannot pipeline further statements.
    pub fn is_connection_broken(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Protocol(_) | Error::Cancelled | Error::Internal(_)
        )
    }

    /// Get the SQLSTATE if this is a server error.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Error::Server(err) => Some(&err.sql_state),
            _ => None,
        }
    }
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Self {
        Error::Server(err)
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

impl<Src: std::fmt::Debug, Dst: std::fmt::Debug + ?Sized>
    From<zerocopy::error::CastError<Src, Dst>> for Error
{
    fn from(err: zerocopy::error::CastError<Src, Dst>) -> Self {
        Error::Protocol(format!("zerocopy cast error: {err:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_display() {
        let err = ServerError::new(1146, "42S02", "Table 'test.t' doesn't exist");
        assert_eq!(
            err.to_string(),
            "ERROR: Table 'test.t' doesn't exist (code 1146, SQLSTATE 42S02)"
        );
        assert_eq!(Error::from(err).sql_state(), Some("42S02"));
    }

    #[test]
    fn broken_connection_classification() {
        assert!(Error::Protocol("bad frame".into()).is_connection_broken());
        assert!(!Error::ReplyBlocked.is_connection_broken());
        assert!(!Error::Server(ServerError::new(1, "HY000", "x")).is_connection_broken());
    }
}
