//! Custom error types and result handling for Shoka operations.
//!
//! All fallible operations return a [`Result<T>`], a type alias for
//! `std::result::Result<T, Error>`.
//!
//! Only configuration problems are fatal. Every other variant describes
//! something that went wrong with a single file: the sync orchestrator catches
//! it, records it in the file's [`FileState`](crate::types::FileState) and
//! moves on.
use std::path::PathBuf;

use crate::types::ClassificationTag;

/// Type alias for Results with Shoka errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all Shoka operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O errors from the standard library
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Async task join errors
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Semaphore(#[from] tokio::sync::AcquireError),
    #[error(transparent)]
    ConfigBuilder(#[from] crate::sync::SyncConfigBuilderError),
    /// Bad or missing source/target configuration. Aborts the run before traversal.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Error for invalid file or directory paths
    #[error("The given path '{0:?}' is invalid: {1}")]
    InvalidPath(PathBuf, String),
    /// Error for resources that couldn't be found (e.g., source directory)
    #[error("Not found: {0}")]
    NotFound(String),
    /// A folder name matched more than one classification term.
    #[error("Folder '{segment}' matches more than one classification: {matches:?}")]
    ClassificationAmbiguity {
        segment: String,
        matches: Vec<ClassificationTag>,
    },
    /// No volume token could be found in the filename.
    #[error("No volume number found in filename '{0}'")]
    UnclassifiableFilename(String),
    /// The external converter failed or cannot handle the file.
    #[error("Conversion of '{path:?}' failed: {reason}")]
    ConversionFailure { path: PathBuf, reason: String },
    /// The artifact was produced but tagging it failed.
    #[error("Writing metadata to '{path:?}' failed: {reason}")]
    MetadataWriteFailure { path: PathBuf, reason: String },
    /// A required external executable is not on the PATH.
    #[error("Executable '{0}' not found in PATH")]
    ToolNotFound(String),
    /// Other errors that don't fit into specific categories
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::InvalidPath(..)
                | Error::NotFound(_)
                | Error::ConfigBuilder(_)
        )
    }
}

impl From<String> for Error {
    fn from(error: String) -> Self {
        Error::Other(error)
    }
}

impl From<&str> for Error {
    fn from(error: &str) -> Self {
        Error::Other(error.to_string())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}
