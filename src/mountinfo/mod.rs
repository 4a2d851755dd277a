//! Parsing of `/proc/[pid]/mountinfo` and extraction of cgroup mounts.
mod error;
mod parser;
mod scan;

pub use error::{Error, Result};
pub use parser::{MountInfo, MountInfoField, ParseError, parse_mount_info_line};
pub use scan::{CgroupMount, CgroupMountKind, read_cgroup_mounts, read_cgroup_mounts_from_reader};
