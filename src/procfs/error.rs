use std::path::PathBuf;

use crate::fsutil;

/// Errors that may occur while reading procfs files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    FileOpen(#[from] fsutil::FileOpenError),
    #[error("failed to read line for file `{path}`: {source}")]
    ReadLine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse line {line} in file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: ParseError,
    },
    #[error("missing key `{key}` in file `{path}`")]
    MissingKey { path: PathBuf, key: &'static str },
}

/// Errors that may occur when parsing a single procfs line.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("expected {expected} fields, found {found} in line: `{line}`")]
    FieldCount {
        expected: usize,
        found: usize,
        line: String,
    },
    #[error("invalid number `{value}` in line: `{line}`: {source}")]
    InvalidNumber {
        value: String,
        line: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid cpu list `{0}`")]
    InvalidCpuList(String),
}

pub type Result<T> = std::result::Result<T, Error>;
