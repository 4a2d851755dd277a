//! Parsers for the procfs files consulted during cgroup detection and for
//! host-wide resource ceilings.
mod cgroups;
mod error;
mod host;
mod self_cgroup;

pub use cgroups::{CgroupController, read_proc_cgroups, read_proc_cgroups_from_reader};
pub use error::{Error, ParseError, Result};
pub use host::{HostResources, count_cpu_list};
pub use self_cgroup::{ProcessCgroup, read_self_cgroup, read_self_cgroup_from_reader};

use std::io::BufRead;
use std::path::Path;

/// Feeds every non-empty line of `reader` to `parse`, collecting the `Some` results.
///
/// Parse failures are reported with their 1-based line number and `origin`.
fn parse_lines<R, T>(
    mut reader: R,
    origin: &Path,
    mut parse: impl FnMut(&str) -> std::result::Result<Option<T>, ParseError>,
) -> Result<Vec<T>>
where
    R: BufRead,
{
    let mut line = String::with_capacity(128);
    let mut lineno = 0;
    let mut out = Vec::new();

    while reader.read_line(&mut line).map_err(|source| Error::ReadLine {
        path: origin.to_path_buf(),
        source,
    })? != 0
    {
        lineno += 1;
        let entry = line.trim_end_matches('\n');
        if !entry.trim().is_empty() {
            let parsed = parse(entry).map_err(|source| Error::Parse {
                path: origin.to_path_buf(),
                line: lineno,
                source,
            })?;
            out.extend(parsed);
        }
        line.clear();
    }

    Ok(out)
}
