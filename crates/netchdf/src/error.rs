//! Error type for the high-level reader.

use std::io;

use netchdf_filters::FilterError;
use netchdf_format::FormatError;

/// Errors returned by [`Hdf5File`](crate::Hdf5File) and its helpers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O failure, including a file shorter than its metadata claims.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed on-disk structure.
    #[error("HDF5 format error: {0}")]
    Format(FormatError),

    /// A requested section does not fit the variable.
    #[error("invalid range: {0}")]
    Range(String),

    /// Valid HDF5 that this reader does not implement.
    #[error("unsupported feature: {0}")]
    Unsupported(String),

    /// A chunk could not be run back through its filter pipeline.
    #[error("filter error: {0}")]
    Filter(FilterError),

    /// No object at the given path.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        match e {
            FormatError::Unsupported(what) => Error::Unsupported(what),
            FormatError::UnexpectedEof { .. } => {
                Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, e.to_string()))
            }
            other => Error::Format(other),
        }
    }
}

impl From<FilterError> for Error {
    fn from(e: FilterError) -> Self {
        match e {
            FilterError::Unsupported(what) => Error::Unsupported(what),
            other => Error::Filter(other),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
