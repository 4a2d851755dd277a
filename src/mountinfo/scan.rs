use crate::fsutil;

use super::parser::parse_mount_info_line;
use super::{Error, Result};
use std::io::BufRead;
use std::path::Path;

/// Which cgroup filesystem a mount belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CgroupMountKind {
    /// A `cgroup` (v1) mount together with the controllers listed in its super options.
    V1 { controllers: Vec<String> },
    /// The `cgroup2` unified hierarchy.
    V2,
}

/// A cgroup filesystem mount taken from a mountinfo file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupMount {
    pub kind: CgroupMountKind,
    /// Root of the mount within the hierarchy.
    pub root: String,
    /// Absolute mount point.
    pub mount_point: String,
}

impl CgroupMount {
    /// Returns true if this is a v1 mount with `controller` bound to it.
    pub fn has_controller(&self, controller: &str) -> bool {
        match &self.kind {
            CgroupMountKind::V1 { controllers } => controllers.iter().any(|c| c == controller),
            CgroupMountKind::V2 => false,
        }
    }
}

/// Reads all `cgroup` and `cgroup2` mounts from a Linux `mountinfo` file, in file order.
///
/// # Errors
///
/// - [`Error::FileOpen`] if the file can't be opened.
/// - [`Error::ReadLine`] if reading from the file fails.
/// - [`Error::Parse`] if any line is malformed, cgroup related or not.
///
/// # Example
///
/// ```no_run
/// use cgroup_probe::mountinfo::read_cgroup_mounts;
///
/// for mount in read_cgroup_mounts("/proc/self/mountinfo").unwrap() {
///     println!("{:?} at {}", mount.kind, mount.mount_point);
/// }
/// ```
pub fn read_cgroup_mounts(path: impl AsRef<Path>) -> Result<Vec<CgroupMount>> {
    let path = path.as_ref();
    let buf = fsutil::open_file_reader(path)?;

    read_cgroup_mounts_from_reader(buf, path)
}

/// Reader based variant of [`read_cgroup_mounts`]; `origin` is only used in errors.
///
/// # Errors
///
/// See [`read_cgroup_mounts`].
pub fn read_cgroup_mounts_from_reader<R: BufRead>(
    mut reader: R,
    origin: &Path,
) -> Result<Vec<CgroupMount>> {
    let mut line = String::with_capacity(256);
    let mut lineno = 0;
    let mut mounts = Vec::new();

    while reader
        .read_line(&mut line)
        .map_err(|source| Error::ReadLine {
            path: origin.to_path_buf(),
            source,
        })?
        != 0
    {
        lineno += 1;
        let entry = line.trim_end_matches('\n');
        if entry.trim().is_empty() {
            line.clear();
            continue;
        }

        let mount_info = parse_mount_info_line(entry).map_err(|source| Error::Parse {
            path: origin.to_path_buf(),
            line: lineno,
            source,
        })?;

        let kind = match mount_info.fs_type {
            "cgroup2" => Some(CgroupMountKind::V2),
            "cgroup" => Some(CgroupMountKind::V1 {
                controllers: mount_info.super_options().map(str::to_owned).collect(),
            }),
            _ => None,
        };

        if let Some(kind) = kind {
            log::trace!(
                "Found {} mount with root `{}` at `{}`",
                mount_info.fs_type,
                mount_info.root,
                mount_info.mount_point
            );
            mounts.push(CgroupMount {
                kind,
                root: mount_info.root.to_owned(),
                mount_point: mount_info.mount_point.to_owned(),
            });
        }

        line.clear();
    }

    Ok(mounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_collects_v1_and_v2_mounts() {
        let input = "\
25 30 0:23 / /proc rw,relatime - proc proc rw
33 25 0:28 / /sys/fs/cgroup/memory rw,nosuid shared:15 - cgroup cgroup rw,memory
34 25 0:29 /docker/abc /sys/fs/cgroup/cpu,cpuacct rw shared:16 - cgroup cgroup rw,cpu,cpuacct
35 25 0:30 / /sys/fs/cgroup/unified rw shared:17 - cgroup2 cgroup2 rw,nsdelegate
";
        let mounts = read_cgroup_mounts_from_reader(input.as_bytes(), Path::new("/dummy")).unwrap();

        assert_eq!(mounts.len(), 3);
        assert!(mounts[0].has_controller("memory"));
        assert_eq!(mounts[1].root, "/docker/abc");
        assert!(mounts[1].has_controller("cpu"));
        assert!(mounts[1].has_controller("cpuacct"));
        assert!(!mounts[1].has_controller("cpuset"));
        assert_eq!(mounts[2].kind, CgroupMountKind::V2);
        assert_eq!(mounts[2].mount_point, "/sys/fs/cgroup/unified");
    }

    #[test]
    fn test_no_cgroup_mounts() {
        let input = "25 30 0:23 / /proc rw,relatime - proc proc rw\n";
        let mounts = read_cgroup_mounts_from_reader(input.as_bytes(), Path::new("/dummy")).unwrap();
        assert!(mounts.is_empty());
    }

    #[test]
    fn test_invalid_line_reports_line_number() {
        let input = "25 30 0:23 / /proc rw,relatime - proc proc rw\ninvalid mountinfo line\n";
        let err =
            read_cgroup_mounts_from_reader(input.as_bytes(), Path::new("/dummy")).unwrap_err();
        match err {
            Error::Parse { path, line, .. } => {
                assert_eq!(path, Path::new("/dummy"));
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_read_from_tempfile() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            "42 35 0:39 / /sys/fs/cgroup rw,nosuid,nodev,noexec,relatime - cgroup2 cgroup2 rw"
        )
        .unwrap();

        let mounts = read_cgroup_mounts(tmp.path()).unwrap();
        assert_eq!(
            mounts,
            vec![CgroupMount {
                kind: CgroupMountKind::V2,
                root: "/".to_owned(),
                mount_point: "/sys/fs/cgroup".to_owned(),
            }]
        );
    }

    #[test]
    fn test_missing_file() {
        let err = read_cgroup_mounts("/definitely/does/not/exist").unwrap_err();
        assert!(matches!(err, Error::FileOpen(_)));
    }
}
