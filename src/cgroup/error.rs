use std::path::PathBuf;

use crate::fsutil;

/// Failure to read a value from a controller's control file.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("controller has no resolved subsystem path")]
    Unusable,
    #[error(transparent)]
    FileOpen(#[from] fsutil::FileOpenError),
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("file `{path}` is empty")]
    Empty { path: PathBuf },
    #[error("line in `{path}` exceeds {max} bytes")]
    LineTooLong { path: PathBuf, max: usize },
    #[error("unexpected content in `{path}`: `{content}`")]
    FormatMismatch { path: PathBuf, content: String },
    #[error("key `{key}` not found in `{path}`")]
    KeyNotFound { path: PathBuf, key: String },
}

pub type Result<T> = std::result::Result<T, ReadError>;
