use std::io::BufRead;
use std::path::Path;

use crate::fsutil;

use super::{ParseError, Result, parse_lines};

/// A controller entry from `/proc/cgroups`.
///
/// ```text
/// #subsys_name    hierarchy       num_cgroups     enabled
/// cpuset          3               1               1
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupController {
    /// Controller name, e.g. `memory`.
    pub name: String,
    /// Hierarchy ID; always `0` when the controller lives on the unified (v2) hierarchy.
    pub hierarchy: u32,
    /// Number of control groups in the hierarchy.
    pub num_cgroups: u32,
    /// Whether the controller is enabled by the kernel.
    pub enabled: bool,
}

impl CgroupController {
    fn parse(line: &str) -> std::result::Result<Option<Self>, ParseError> {
        if line.starts_with('#') {
            return Ok(None);
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [name, hierarchy, num_cgroups, enabled] = fields[..] else {
            return Err(ParseError::FieldCount {
                expected: 4,
                found: fields.len(),
                line: line.to_owned(),
            });
        };

        let number = |value: &str| {
            value
                .parse::<u32>()
                .map_err(|source| ParseError::InvalidNumber {
                    value: value.to_owned(),
                    line: line.to_owned(),
                    source,
                })
        };

        Ok(Some(Self {
            name: name.to_owned(),
            hierarchy: number(hierarchy)?,
            num_cgroups: number(num_cgroups)?,
            enabled: number(enabled)? == 1,
        }))
    }
}

/// Reads the controller table from a `/proc/cgroups` style file.
///
/// # Errors
///
/// Returns [`super::Error`] if the file cannot be read or a line is malformed.
pub fn read_proc_cgroups(path: impl AsRef<Path>) -> Result<Vec<CgroupController>> {
    let path = path.as_ref();
    let buf = fsutil::open_file_reader(path)?;
    read_proc_cgroups_from_reader(buf, path)
}

/// Reader based variant of [`read_proc_cgroups`].
///
/// # Errors
///
/// See [`read_proc_cgroups`].
pub fn read_proc_cgroups_from_reader<R: BufRead>(
    reader: R,
    origin: &Path,
) -> Result<Vec<CgroupController>> {
    parse_lines(reader, origin, CgroupController::parse)
}
