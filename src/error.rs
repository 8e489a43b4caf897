use std::path::PathBuf;

use thiserror::Error;

/// An error from a namespace operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("malformed archive {container}: {message}")]
    Format { container: String, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("I/O error on {path}: {err}")]
    PathIo { path: PathBuf, err: std::io::Error },
    #[error("invalid state: {0}")]
    State(&'static str),
}

/// The type of Result.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn format(container: impl AsRef<str>, message: impl Into<String>) -> Self {
        Error::Format {
            container: container.as_ref().to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn path_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Error::PathIo {
            path: path.into(),
            err,
        }
    }
}
