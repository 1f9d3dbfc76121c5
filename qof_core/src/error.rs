//! Error types shared by every file operation

use std::fmt;

use thiserror::Error;

use crate::files::validation::ValidationError;
use crate::storage::StorageError;

pub type Result<T> = std::result::Result<T, QofError>;

/// The public operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Upload,
    Download,
    Preview,
    Delete,
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileOperation::Upload => "upload",
            FileOperation::Download => "download",
            FileOperation::Preview => "preview",
            FileOperation::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum QofError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Preview not supported for file type [{0}]")]
    UnsupportedType(String),

    #[error("Unsupported storage mode [{mode}], supported modes: {supported}")]
    UnsupportedMode { mode: String, supported: String },

    #[error("Storage mode [{mode}] is not enabled (set qof.{mode}.enable); registered modes: {registered}")]
    ModeNotEnabled { mode: String, registered: String },

    #[error("File {operation} failed, please retry later")]
    BackendService {
        operation: FileOperation,
        #[source]
        source: StorageError,
    },

    #[error("File {operation} failed, storage unreachable")]
    BackendClient {
        operation: FileOperation,
        #[source]
        source: StorageError,
    },

    #[error("File {operation} rejected: illegal storage path")]
    Security { operation: FileOperation },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QofError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        QofError::Configuration(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        QofError::NotFound(msg.into())
    }

    /// Attaches the failing operation to an adapter error.
    pub fn storage(operation: FileOperation, err: StorageError) -> Self {
        match err {
            StorageError::NotFound => QofError::NotFound("File does not exist".to_string()),
            StorageError::PathTraversal => QofError::Security { operation },
            StorageError::Configuration(msg) => QofError::Configuration(msg),
            StorageError::TooLarge { size, max } => ValidationError::FileTooLarge { size, max }.into(),
            err @ StorageError::Service { .. } => QofError::BackendService { operation, source: err },
            err @ (StorageError::Client { .. } | StorageError::Io(_)) => {
                QofError::BackendClient { operation, source: err }
            }
        }
    }

    /// Whether the caller can fix the request and try again.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            QofError::Validation(_)
                | QofError::NotFound(_)
                | QofError::AccessDenied(_)
                | QofError::UnsupportedType(_)
        )
    }
}

impl From<config::ConfigError> for QofError {
    fn from(err: config::ConfigError) -> Self {
        QofError::Configuration(err.to_string())
    }
}
