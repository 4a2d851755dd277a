//! Scanning primitives for cgroup control files.
//!
//! Control files are tiny pseudo-files in one of two shapes:
//!
//! - **Single-line** files such as `memory.max` (`max` or a number),
//!   `cpu.max` (`<quota> <period>`) or `cpuset.cpus` (`0-3`).
//! - **Key/value** files such as `memory.stat`, one `<key> <value>` pair per line.
//!
//! Every read opens the file, scans it and closes it again. Lines are bounded by a
//! caller supplied maximum length.

use std::io::BufRead;
use std::path::Path;

use crate::fsutil::{self, BoundedLine};

use super::{ReadError, Result};

/// Selects one token of a two-token line such as `cpu.max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleValue {
    First,
    Second,
}

/// A limit as stored in a control file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// A concrete limit below the caller's upper bound.
    Value(u64),
    /// `max`, a negative value, or a value at or above the caller's upper bound.
    Unlimited,
}

/// Reads the first line of `path`.
///
/// # Errors
///
/// Returns [`ReadError::FileOpen`] if the file can't be opened, [`ReadError::Empty`]
/// if it has no content and [`ReadError::LineTooLong`] if the line exceeds `max_len`.
pub fn read_first_line(path: &Path, max_len: usize) -> Result<String> {
    let mut buf = fsutil::open_file_reader(path)?;
    first_line_from_reader(&mut buf, path, max_len)
}

fn first_line_from_reader<R: BufRead>(
    reader: &mut R,
    origin: &Path,
    max_len: usize,
) -> Result<String> {
    match fsutil::read_bounded_line(reader, max_len) {
        Ok(BoundedLine::Line(line)) => Ok(line),
        Ok(BoundedLine::Eof) => Err(ReadError::Empty {
            path: origin.to_path_buf(),
        }),
        Ok(BoundedLine::TooLong) => Err(ReadError::LineTooLong {
            path: origin.to_path_buf(),
            max: max_len,
        }),
        Err(source) => Err(ReadError::Io {
            path: origin.to_path_buf(),
            source,
        }),
    }
}

/// Extracts the single token of a one-value line.
///
/// # Errors
///
/// Returns [`ReadError::FormatMismatch`] unless the line holds exactly one token.
pub fn single_token(line: &str, origin: &Path) -> Result<String> {
    let mut tokens = line.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(token), None) => Ok(token.to_owned()),
        _ => Err(mismatch(line, origin)),
    }
}

/// Extracts one token of a two-token line.
///
/// # Errors
///
/// Returns [`ReadError::FormatMismatch`] unless the line holds exactly two tokens.
pub fn tuple_token(line: &str, value: TupleValue, origin: &Path) -> Result<String> {
    let mut tokens = line.split_whitespace();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(first), Some(second), None) => Ok(match value {
            TupleValue::First => first.to_owned(),
            TupleValue::Second => second.to_owned(),
        }),
        _ => Err(mismatch(line, origin)),
    }
}

/// Parses an unsigned number; a missing or malformed value is a mismatch, never zero.
///
/// # Errors
///
/// Returns [`ReadError::FormatMismatch`] if `token` is not an unsigned integer.
pub fn parse_number(token: &str, origin: &Path) -> Result<u64> {
    token.parse::<u64>().map_err(|_| mismatch(token, origin))
}

/// Parses a signed number such as the `-1` of `cpu.cfs_quota_us`.
///
/// # Errors
///
/// Returns [`ReadError::FormatMismatch`] if `token` is not an integer.
pub fn parse_signed(token: &str, origin: &Path) -> Result<i64> {
    token.parse::<i64>().map_err(|_| mismatch(token, origin))
}

/// Parses a limit, mapping `max`, negative values and values at or above
/// `upper_bound` to [`Limit::Unlimited`].
///
/// cgroup v1 reports "no limit" as a page-aligned `i64::MAX`, which any realistic
/// host ceiling maps to unlimited.
///
/// # Errors
///
/// Returns [`ReadError::FormatMismatch`] for anything else that isn't a number.
pub fn parse_limit(token: &str, upper_bound: u64, origin: &Path) -> Result<Limit> {
    if token == "max" {
        return Ok(Limit::Unlimited);
    }
    if token.starts_with('-') {
        parse_signed(token, origin)?;
        return Ok(Limit::Unlimited);
    }

    let value = parse_number(token, origin)?;
    if value >= upper_bound {
        Ok(Limit::Unlimited)
    } else {
        Ok(Limit::Value(value))
    }
}

/// Looks up `key` in a key/value control file such as `memory.stat`.
///
/// # Errors
///
/// See [`key_value_from_reader`].
pub fn read_key_value(path: &Path, key: &str, max_len: usize) -> Result<u64> {
    let mut buf = fsutil::open_file_reader(path)?;
    key_value_from_reader(&mut buf, path, key, max_len)
}

/// Scans lines for `<key><whitespace><value>` and parses the value of the first match.
///
/// `key` only matches as a whole token: `cpu` never matches a `cpu.shares` line,
/// and a key at the very end of a line has no value and does not match. Lines
/// longer than `max_len` are skipped.
///
/// # Errors
///
/// Returns [`ReadError::KeyNotFound`] if no line matches, [`ReadError::FormatMismatch`]
/// if the value is not a number, and [`ReadError::Io`] if scanning fails.
pub fn key_value_from_reader<R: BufRead>(
    reader: &mut R,
    origin: &Path,
    key: &str,
    max_len: usize,
) -> Result<u64> {
    loop {
        let line = match fsutil::read_bounded_line(reader, max_len) {
            Ok(BoundedLine::Line(line)) => line,
            Ok(BoundedLine::Eof) => break,
            Ok(BoundedLine::TooLong) => {
                log::trace!(
                    target: "cgroup",
                    "Skipping line longer than {max_len} bytes in `{}`",
                    origin.display()
                );
                fsutil::skip_line(reader).map_err(|source| ReadError::Io {
                    path: origin.to_path_buf(),
                    source,
                })?;
                continue;
            }
            Err(source) => {
                return Err(ReadError::Io {
                    path: origin.to_path_buf(),
                    source,
                });
            }
        };

        let Some(rest) = line.strip_prefix(key) else {
            continue;
        };
        if !rest.starts_with([' ', '\t']) {
            continue;
        }
        if let Some(value) = rest.split_whitespace().next() {
            return parse_number(value, origin);
        }
    }

    Err(ReadError::KeyNotFound {
        path: origin.to_path_buf(),
        key: key.to_owned(),
    })
}

fn mismatch(content: &str, origin: &Path) -> ReadError {
    ReadError::FormatMismatch {
        path: origin.to_path_buf(),
        content: content.to_owned(),
    }
}
