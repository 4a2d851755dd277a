use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// Error that occurs when opening a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// Pseudo-files are opened per read and closed when the reader is dropped.
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use cgroup_probe::fsutil;
/// let reader = fsutil::open_file_reader("/proc/self/cgroup")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Outcome of [`read_bounded_line`].
#[derive(Debug, PartialEq, Eq)]
pub enum BoundedLine {
    /// A complete line (without the trailing newline).
    Line(String),
    /// The line exceeded the given bound.
    TooLong,
    /// The reader was already at EOF.
    Eof,
}

/// Reads a single line of at most `max_len` bytes (newline excluded).
///
/// Never buffers more than `max_len + 1` bytes of an overlong line.
///
/// # Errors
///
/// Propagates I/O errors from the underlying reader, including invalid UTF-8.
pub fn read_bounded_line<R: BufRead>(reader: &mut R, max_len: usize) -> io::Result<BoundedLine> {
    let mut line = String::new();
    let limit = u64::try_from(max_len).unwrap_or(u64::MAX).saturating_add(1);
    let n = reader.by_ref().take(limit).read_line(&mut line)?;
    if n == 0 {
        return Ok(BoundedLine::Eof);
    }

    if line.ends_with('\n') {
        line.pop();
    } else if line.len() > max_len {
        return Ok(BoundedLine::TooLong);
    }

    Ok(BoundedLine::Line(line))
}

/// Discards the rest of the current line, e.g. after [`BoundedLine::TooLong`].
///
/// # Errors
///
/// Propagates I/O errors from the underlying reader.
pub fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    reader.skip_until(b'\n')?;
    Ok(())
}
