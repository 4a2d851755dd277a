use std::io::BufRead;
use std::path::Path;

use crate::fsutil;

use super::{ParseError, Result, parse_lines};

/// A line of `/proc/[pid]/cgroup`: `<hierarchy-id>:<controller-list>:<cgroup-path>`.
///
/// For cgroup v2 the hierarchy ID is `0` and the controller list is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCgroup {
    pub hierarchy: u32,
    /// Comma-separated controllers of a v1 hierarchy, split.
    pub controllers: Vec<String>,
    /// Path of the process's cgroup relative to the hierarchy root.
    pub path: String,
}

impl ProcessCgroup {
    /// Returns true for the unified hierarchy line `0::<path>`.
    pub fn is_unified(&self) -> bool {
        self.hierarchy == 0 && self.controllers.is_empty()
    }

    fn parse(line: &str) -> std::result::Result<Option<Self>, ParseError> {
        let mut fields = line.splitn(3, ':');
        let (Some(hierarchy), Some(controllers), Some(path)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(ParseError::FieldCount {
                expected: 3,
                found: line.split(':').count(),
                line: line.to_owned(),
            });
        };

        let hierarchy = hierarchy
            .parse::<u32>()
            .map_err(|source| ParseError::InvalidNumber {
                value: hierarchy.to_owned(),
                line: line.to_owned(),
                source,
            })?;

        Ok(Some(Self {
            hierarchy,
            controllers: controllers
                .split(',')
                .filter(|c| !c.is_empty())
                .map(str::to_owned)
                .collect(),
            path: path.to_owned(),
        }))
    }
}

/// Reads a `/proc/[pid]/cgroup` style file.
///
/// # Errors
///
/// Returns [`super::Error`] if the file cannot be read or a line is malformed.
pub fn read_self_cgroup(path: impl AsRef<Path>) -> Result<Vec<ProcessCgroup>> {
    let path = path.as_ref();
    let buf = fsutil::open_file_reader(path)?;
    read_self_cgroup_from_reader(buf, path)
}

/// Reader based variant of [`read_self_cgroup`].
///
/// # Errors
///
/// See [`read_self_cgroup`].
pub fn read_self_cgroup_from_reader<R: BufRead>(
    reader: R,
    origin: &Path,
) -> Result<Vec<ProcessCgroup>> {
    parse_lines(reader, origin, ProcessCgroup::parse)
}
