//! Error types shared by the gateway, the local store and the reconciliation layer.

use thiserror::Error;

/// Errors that can occur while reading or writing journals.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum JournalError {
    /// Connection secrets are missing or the client could not be built
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The network probe failed or a remote call never reached the service
    #[error("Network error: {message}")]
    Connectivity { message: String },

    /// The remote service answered, but reported a failure
    #[error("Remote store rejected {operation}: {message}")]
    Remote {
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },

    /// The local fallback store could not be read or written
    #[error("Local storage error: {message}")]
    LocalStorage { message: String },

    /// No journal exists under this identifier
    #[error("Journal {id} not found")]
    NotFound { id: String },

    /// The journal violates a data-model invariant
    #[error("Invalid journal: {message}")]
    Invalid { message: String },
}

/// Coarse classification used for logging and status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Connectivity,
    Remote,
    LocalStorage,
    NotFound,
    Invalid,
}

impl JournalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JournalError::Config { .. } => ErrorKind::Config,
            JournalError::Connectivity { .. } => ErrorKind::Connectivity,
            JournalError::Remote { .. } => ErrorKind::Remote,
            JournalError::LocalStorage { .. } => ErrorKind::LocalStorage,
            JournalError::NotFound { .. } => ErrorKind::NotFound,
            JournalError::Invalid { .. } => ErrorKind::Invalid,
        }
    }

    /// Returns true for the failures a remote create is expected to produce:
    /// missing configuration, an unreachable store or a rejected write. Creates
    /// fall back to the local store on any error; other kinds are logged as
    /// unexpected.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            JournalError::Config { .. }
                | JournalError::Connectivity { .. }
                | JournalError::Remote { .. }
        )
    }

    pub(crate) fn remote(operation: &'static str, message: impl Into<String>) -> Self {
        JournalError::Remote {
            operation,
            status: None,
            message: message.into(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        JournalError::Invalid {
            message: message.into(),
        }
    }

    pub(crate) fn local(message: impl Into<String>) -> Self {
        JournalError::LocalStorage {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for JournalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return JournalError::Remote {
                operation: "decode",
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            };
        }

        JournalError::Connectivity {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for JournalError {
    fn from(err: url::ParseError) -> Self {
        JournalError::Config {
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for JournalError {
    fn from(err: rusqlite::Error) -> Self {
        JournalError::LocalStorage {
            message: err.to_string(),
        }
    }
}
