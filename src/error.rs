//! Error handling for the rotating sink
//!
//! This module provides error types and result aliases for sink operations.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur in sink operations
#[derive(Error, Debug)]
pub enum Error {
    /// Errors related to I/O operations without a known path
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Filesystem errors with the operation and path that failed
    #[error("failed to {op} {path:?}: {source}")]
    File {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Errors related to serialization/deserialization of configuration
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors related to configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to compression of a backup
    #[error("Compression error for {path:?}: {message}")]
    Compression {
        path: PathBuf,
        message: String,
    },

    /// The sink has been closed
    #[error("Sink is closed")]
    Closed,

    /// Generic error type for other cases
    #[error("{0}")]
    Other(String),
}

/// Result type for sink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Callback for failures that happen off the write path (removal,
/// compression, timer-driven rotation). Must not block.
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Handler used when none is configured: one line on stderr per error.
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|err: &Error| {
        tracing::warn!(error = %err, "background sink failure");
        eprintln!("cocoon_rotate: {}", err);
    })
}

impl Error {
    /// Create a new filesystem error
    pub fn file(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            op,
            path: path.into(),
            source,
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new compression error
    pub fn compression(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Compression {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Check if this is an I/O error (with or without path context)
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io(_) | Self::File { .. })
    }

    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if the sink was already closed
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// The underlying I/O error kind, if any
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io(err) => Some(err.kind()),
            Self::File { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// The path involved in the failure, if known
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::File { path, .. } | Self::Compression { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Get a user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<String> {
        match self.io_kind() {
            Some(io::ErrorKind::NotFound) => {
                return Some("The log directory or file disappeared; check that nothing else removes it".to_string())
            }
            Some(io::ErrorKind::PermissionDenied) => {
                return Some("Verify permissions on the log directory".to_string())
            }
            _ => {}
        }

        match self {
            Self::Config(_) => Some("Check the rotation policy passed to the sink".to_string()),
            Self::Closed => Some("The sink was closed; create a new one to keep writing".to_string()),
            Self::Compression { .. } => {
                Some("The backup stays uncompressed and is retried on the next maintenance pass".to_string())
            }
            _ => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            err => {
                let kind = match &err {
                    Error::File { source, .. } => source.kind(),
                    Error::Closed => io::ErrorKind::BrokenPipe,
                    _ => io::ErrorKind::Other,
                };
                io::Error::new(kind, err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_err = Error::config("interval too short");
        assert!(config_err.is_config_error());

        let file_err = Error::file(
            "rename",
            "/var/log/app.log",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(file_err.is_io_error());
        assert_eq!(file_err.path(), Some(&PathBuf::from("/var/log/app.log")));
        assert_eq!(file_err.io_kind(), Some(io::ErrorKind::PermissionDenied));
    }

    #[test]
    fn test_file_error_message_has_context() {
        let err = Error::file(
            "open",
            "/tmp/x.log",
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        let message = err.to_string();
        assert!(message.contains("open"));
        assert!(message.contains("/tmp/x.log"));
        assert!(message.contains("missing"));
    }

    #[test]
    fn test_into_io_error_keeps_kind() {
        let err = Error::file(
            "write",
            "/tmp/x.log",
            io::Error::new(io::ErrorKind::Interrupted, "signal"),
        );
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::Interrupted);

        let io_err: io::Error = Error::Closed.into();
        assert_eq!(io_err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_default_handler_does_not_panic() {
        let handler = default_error_handler();
        handler(&Error::other("compression failed"));
    }

    #[test]
    fn test_suggestion() {
        let err = Error::file(
            "create",
            "/root/log",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.suggestion().unwrap().contains("permissions"));

        assert!(Error::Closed.suggestion().is_some());
        assert!(Error::other("x").suggestion().is_none());
    }
}
