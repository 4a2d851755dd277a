use std::path::{Path, PathBuf};

/// Location of a controller's control files.
///
/// Holds the raw strings taken from `/proc/self/mountinfo` and `/proc/self/cgroup`
/// together with the directory resolved from them once, at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerPath {
    root: String,
    mount_point: String,
    cgroup_path: String,
    path: Option<PathBuf>,
}

impl ControllerPath {
    /// Resolves the subsystem directory for the given mountinfo root, mount point and
    /// process cgroup path.
    ///
    /// If resolution fails the controller is unusable; see [`resolve_subsystem_path`].
    pub fn new(
        root: impl Into<String>,
        mount_point: impl Into<String>,
        cgroup_path: impl Into<String>,
    ) -> Self {
        let root = root.into();
        let mount_point = mount_point.into();
        let cgroup_path = cgroup_path.into();
        let path = resolve_subsystem_path(&root, &mount_point, &cgroup_path);
        match &path {
            Some(path) => log::debug!("Controller path resolved to `{}`", path.display()),
            None => log::debug!(
                "Unable to resolve controller path: root=`{root}`, mount_point=`{mount_point}`, cgroup_path=`{cgroup_path}`"
            ),
        }

        Self {
            root,
            mount_point,
            cgroup_path,
            path,
        }
    }

    /// The resolved directory, or `None` if the controller is unusable.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    pub fn cgroup_path(&self) -> &str {
        &self.cgroup_path
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect()
}

/// Computes the directory holding a controller's control files.
///
/// - With a mount root of `/` the whole cgroup path is appended to the mount point.
/// - When the container runtime mounted a sub-directory of the hierarchy, the mount
///   root is a leading part of the cgroup path. Those leading segments are already
///   represented by the mount point and get trimmed before appending the rest.
///
/// Returns `None` when the mount root is deeper than the cgroup path or is not a
/// leading part of it; the layout is unexpected and no path is guessed.
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use cgroup_probe::cgroup::resolve_subsystem_path;
///
/// let path = resolve_subsystem_path("/docker/abc", "/sys/fs/cgroup/memory", "/docker/abc/sub");
/// assert_eq!(path, Some(PathBuf::from("/sys/fs/cgroup/memory/sub")));
/// ```
pub fn resolve_subsystem_path(
    root: &str,
    mount_point: &str,
    cgroup_path: &str,
) -> Option<PathBuf> {
    let root_segments = segments(root);
    let cgroup_segments = segments(cgroup_path);

    let trim = root_segments.len();
    if trim > cgroup_segments.len() {
        log::debug!(
            "Mount root `{root}` has {trim} segments, cgroup path `{cgroup_path}` only {}",
            cgroup_segments.len()
        );
        return None;
    }

    let (prefix, rest) = cgroup_segments.split_at(trim);
    if prefix != root_segments.as_slice() {
        log::debug!("Mount root `{root}` is not a prefix of cgroup path `{cgroup_path}`");
        return None;
    }

    let mut path = PathBuf::from(mount_point);
    path.extend(rest);
    Some(path)
}
