//! Detection of the cgroup hierarchy governing this process.
//!
//! Detection combines three procfs files:
//!
//! - `/proc/cgroups` tells which controllers the kernel enabled and on which
//!   hierarchy. All required controllers on hierarchy `0` means cgroup v2.
//! - `/proc/self/mountinfo` tells where the hierarchies are mounted.
//! - `/proc/self/cgroup` tells the process's path within each hierarchy.
//!
//! Anything short of a consistent v1 or v2 layout results in an invalid
//! [`CgroupVersion`] and no subsystem.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::mountinfo::{self, CgroupMount, CgroupMountKind};
use crate::procfs::{self, HostResources, ProcessCgroup};

use super::cache::{CachingController, Clock, MonotonicClock};
use super::controller::{CgroupController, CgroupCpusetController, CgroupPidsController};
use super::path::ControllerPath;
use super::subsystem::{AnyCpuController, AnyMemoryController, CgroupSubsystem};
use super::v1::{CgroupV1CpuController, CgroupV1MemoryController};
use super::v2::{CgroupV2CpuController, CgroupV2MemoryController};

/// Outcome of cgroup detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CgroupVersion {
    #[default]
    Unset,
    V1,
    V2,
    /// Hierarchy IDs indicate v2 but the unified hierarchy is not usable.
    InvalidV2,
    /// A v1 controller is mounted but the process's cgroup for it is unknown.
    InvalidV1,
    /// A required controller has no cgroup mount at all.
    InvalidNoMount,
    /// A procfs file is unreadable or malformed, or a required controller is disabled.
    InvalidGeneric,
}

impl CgroupVersion {
    /// Returns true for [`CgroupVersion::V1`] and [`CgroupVersion::V2`].
    pub fn is_valid(self) -> bool {
        matches!(self, Self::V1 | Self::V2)
    }
}

impl fmt::Display for CgroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unset => "unset",
            Self::V1 => "cgroup v1",
            Self::V2 => "cgroup v2",
            Self::InvalidV2 => "invalid cgroup v2",
            Self::InvalidV1 => "invalid cgroup v1",
            Self::InvalidNoMount => "no cgroup mount",
            Self::InvalidGeneric => "invalid cgroup configuration",
        };
        f.write_str(name)
    }
}

/// The controllers taken into account during detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    Cpuset,
    Cpu,
    Cpuacct,
    Memory,
    Pids,
}

impl ControllerKind {
    pub const ALL: [ControllerKind; 5] = [
        ControllerKind::Cpuset,
        ControllerKind::Cpu,
        ControllerKind::Cpuacct,
        ControllerKind::Memory,
        ControllerKind::Pids,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ControllerKind::Cpuset => "cpuset",
            ControllerKind::Cpu => "cpu",
            ControllerKind::Cpuacct => "cpuacct",
            ControllerKind::Memory => "memory",
            ControllerKind::Pids => "pids",
        }
    }

    /// Everything but `pids`, which older kernels lack.
    pub fn is_required(self) -> bool {
        !matches!(self, ControllerKind::Pids)
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// What detection learned about one controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgroupInfo {
    pub name: &'static str,
    /// Hierarchy ID from `/proc/cgroups`; meaningless for v2.
    pub hierarchy_id: Option<u32>,
    pub enabled: bool,
    /// v1 only: both the mount and the process's cgroup path are known.
    pub data_complete: bool,
    /// From `/proc/self/cgroup`.
    pub cgroup_path: Option<String>,
    /// Mount root from `/proc/self/mountinfo`.
    pub root_mount_path: Option<String>,
    /// Mount point from `/proc/self/mountinfo`.
    pub mount_path: Option<String>,
}

impl CgroupInfo {
    fn bind_mount(&mut self, mount: &CgroupMount) {
        self.mount_path = Some(mount.mount_point.clone());
        self.root_mount_path = Some(mount.root.clone());
    }

    fn location(&self) -> Option<ControllerPath> {
        Some(ControllerPath::new(
            self.root_mount_path.as_deref()?,
            self.mount_path.as_deref()?,
            self.cgroup_path.as_deref()?,
        ))
    }
}

/// Result of [`determine_type`].
#[derive(Debug)]
pub struct Detection {
    pub version: CgroupVersion,
    pub infos: [CgroupInfo; 5],
}

impl Detection {
    pub fn info(&self, kind: ControllerKind) -> &CgroupInfo {
        &self.infos[kind.index()]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no cgroup subsystem available: {0}")]
    Unavailable(CgroupVersion),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the cgroup layout described by the three procfs files.
///
/// Never fails; unreadable or inconsistent input yields an invalid version.
pub fn determine_type(
    proc_cgroups: &Path,
    proc_self_cgroup: &Path,
    proc_self_mountinfo: &Path,
) -> Detection {
    let mut infos = ControllerKind::ALL.map(|kind| CgroupInfo {
        name: kind.name(),
        ..CgroupInfo::default()
    });
    let version = classify(&mut infos, proc_cgroups, proc_self_cgroup, proc_self_mountinfo);
    log::debug!(target: "cgroup", "Detected {version}");
    Detection { version, infos }
}

fn classify(
    infos: &mut [CgroupInfo; 5],
    proc_cgroups: &Path,
    proc_self_cgroup: &Path,
    proc_self_mountinfo: &Path,
) -> CgroupVersion {
    let controllers = match procfs::read_proc_cgroups(proc_cgroups) {
        Ok(controllers) => controllers,
        Err(err) => {
            log::debug!(target: "cgroup", "Unable to read controller table: {err}");
            return CgroupVersion::InvalidGeneric;
        }
    };
    for controller in &controllers {
        if let Some(kind) = ControllerKind::from_name(&controller.name) {
            let info = &mut infos[kind.index()];
            info.hierarchy_id = Some(controller.hierarchy);
            info.enabled = controller.enabled;
        }
    }

    let mut is_v2 = true;
    let mut all_required_enabled = true;
    for kind in ControllerKind::ALL {
        let info = &infos[kind.index()];
        if !info.enabled {
            log::debug!(target: "cgroup", "Controller {} is not enabled", kind.name());
        }
        if kind.is_required() {
            is_v2 &= info.hierarchy_id == Some(0);
            all_required_enabled &= info.enabled;
        }
    }
    if !all_required_enabled {
        log::debug!(
            target: "cgroup",
            "One or more required controllers are disabled at kernel level"
        );
        return CgroupVersion::InvalidGeneric;
    }

    let mounts = match mountinfo::read_cgroup_mounts(proc_self_mountinfo) {
        Ok(mounts) => mounts,
        Err(err) => {
            log::debug!(target: "cgroup", "Unable to read mounts: {err}");
            return CgroupVersion::InvalidGeneric;
        }
    };
    let cgroups = match procfs::read_self_cgroup(proc_self_cgroup) {
        Ok(cgroups) => cgroups,
        Err(err) => {
            log::debug!(target: "cgroup", "Unable to read process cgroups: {err}");
            return CgroupVersion::InvalidGeneric;
        }
    };

    if is_v2 {
        classify_v2(infos, &mounts, &cgroups)
    } else {
        classify_v1(infos, &mounts, &cgroups)
    }
}

fn classify_v2(
    infos: &mut [CgroupInfo; 5],
    mounts: &[CgroupMount],
    cgroups: &[ProcessCgroup],
) -> CgroupVersion {
    if mounts.is_empty() {
        log::debug!(target: "cgroup", "No cgroup mounts found");
        return CgroupVersion::InvalidNoMount;
    }
    let Some(mount) = mounts.iter().find(|m| m.kind == CgroupMountKind::V2) else {
        log::debug!(
            target: "cgroup",
            "Controllers are on the unified hierarchy, but no cgroup2 mount was found"
        );
        return CgroupVersion::InvalidV2;
    };
    let Some(unified) = cgroups.iter().find(|c| c.is_unified()) else {
        log::debug!(target: "cgroup", "Process is not a member of the unified hierarchy");
        return CgroupVersion::InvalidV2;
    };

    for info in infos.iter_mut() {
        info.bind_mount(mount);
        info.cgroup_path = Some(unified.path.clone());
    }
    CgroupVersion::V2
}

fn classify_v1(
    infos: &mut [CgroupInfo; 5],
    mounts: &[CgroupMount],
    cgroups: &[ProcessCgroup],
) -> CgroupVersion {
    for mount in mounts {
        if matches!(mount.kind, CgroupMountKind::V2) {
            continue;
        }
        for kind in ControllerKind::ALL {
            if !mount.has_controller(kind.name()) {
                continue;
            }
            let info = &mut infos[kind.index()];
            if let Some(existing) = &info.mount_path {
                log::trace!(
                    target: "cgroup",
                    "Ignoring duplicate {} mount at `{}`, using `{existing}`",
                    kind.name(),
                    mount.mount_point
                );
                continue;
            }
            info.bind_mount(mount);
        }
    }

    for cgroup in cgroups.iter().filter(|c| !c.is_unified()) {
        for controller in &cgroup.controllers {
            if let Some(kind) = ControllerKind::from_name(controller) {
                infos[kind.index()].cgroup_path = Some(cgroup.path.clone());
            }
        }
    }

    for info in infos.iter_mut() {
        info.data_complete = info.mount_path.is_some() && info.cgroup_path.is_some();
    }

    for kind in ControllerKind::ALL {
        let info = &infos[kind.index()];
        if info.data_complete {
            continue;
        }
        if !kind.is_required() {
            log::debug!(
                target: "cgroup",
                "Optional {} controller not found, its metrics are unavailable",
                kind.name()
            );
            continue;
        }
        if info.mount_path.is_none() {
            log::debug!(target: "cgroup", "Required {} controller is not mounted", kind.name());
            return CgroupVersion::InvalidNoMount;
        }
        log::debug!(
            target: "cgroup",
            "Required {} controller has no cgroup path for this process",
            kind.name()
        );
        return CgroupVersion::InvalidV1;
    }

    CgroupVersion::V1
}

/// Detects the cgroup layout and builds the matching subsystem.
///
/// # Errors
///
/// Returns [`Error::Unavailable`] with the invalid version if no cgroup
/// configuration was found. The process should then be treated as unconstrained.
pub fn create(config: &Config) -> Result<CgroupSubsystem> {
    let host = HostResources::detect(config.proc_root());
    create_with(config, host, Arc::new(MonotonicClock::default()))
}

/// [`create`] with explicit host resources and metric clock.
///
/// # Errors
///
/// See [`create`].
pub fn create_with(
    config: &Config,
    host: HostResources,
    clock: Arc<dyn Clock>,
) -> Result<CgroupSubsystem> {
    let detection = determine_type(
        &config.proc_cgroups(),
        &config.proc_self_cgroup(),
        &config.proc_self_mountinfo(),
    );
    let version = detection.version;
    if !version.is_valid() {
        log::debug!(target: "cgroup", "Not running with cgroup limits: {version}");
        return Err(Error::Unavailable(version));
    }

    let controller = |kind: ControllerKind| {
        detection
            .info(kind)
            .location()
            .map(|location| CgroupController::new(location, config.max_line_len))
    };
    let required = |kind: ControllerKind| controller(kind).ok_or(Error::Unavailable(version));

    let (cpu, memory, cpuset, pids) = if version == CgroupVersion::V2 {
        let unified = required(ControllerKind::Memory)?;
        let pids = detection
            .info(ControllerKind::Pids)
            .enabled
            .then(|| CgroupPidsController::new(unified.clone()));
        (
            AnyCpuController::V2(CgroupV2CpuController::new(unified.clone())),
            AnyMemoryController::V2(CgroupV2MemoryController::new(unified.clone())),
            CgroupCpusetController::new(unified, true),
            pids,
        )
    } else {
        let pids = detection
            .info(ControllerKind::Pids)
            .data_complete
            .then(|| controller(ControllerKind::Pids))
            .flatten()
            .map(CgroupPidsController::new);
        (
            AnyCpuController::V1(CgroupV1CpuController::new(required(ControllerKind::Cpu)?)),
            AnyMemoryController::V1(CgroupV1MemoryController::new(required(
                ControllerKind::Memory,
            )?)),
            CgroupCpusetController::new(required(ControllerKind::Cpuset)?, false),
            pids,
        )
    };

    Ok(CgroupSubsystem::new(
        version,
        CachingController::new(cpu, Arc::clone(&clock), config.cache_timeout),
        CachingController::new(memory, clock, config.cache_timeout),
        Some(cpuset),
        pids,
        host,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::cache::ManualClock;
    use crate::cgroup::{MemoryController, UNKNOWN};
    use std::path::PathBuf;

    const HOST: HostResources = HostResources {
        processors: 4,
        physical_memory: 8 << 30,
        swap: 0,
    };

    const V1_CGROUPS: &str = "\
#subsys_name\thierarchy\tnum_cgroups\tenabled
cpuset\t2\t1\t1
cpu\t3\t60\t1
cpuacct\t3\t60\t1
memory\t5\t90\t1
pids\t7\t60\t1
";

    const V2_CGROUPS: &str = "\
#subsys_name\thierarchy\tnum_cgroups\tenabled
cpuset\t0\t80\t1
cpu\t0\t80\t1
cpuacct\t0\t80\t1
memory\t0\t80\t1
pids\t0\t80\t1
";

    /// A fake `/proc` plus cgroup mounts inside one temporary directory.
    struct FakeHost {
        dir: tempfile::TempDir,
    }

    impl FakeHost {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::create_dir_all(dir.path().join("proc/self")).unwrap();
            Self { dir }
        }

        fn path(&self, relative: &str) -> PathBuf {
            self.dir.path().join(relative)
        }

        fn mount(&self, relative: &str) -> String {
            let path = self.path(relative);
            std::fs::create_dir_all(&path).unwrap();
            path.to_str().unwrap().to_owned()
        }

        fn write(&self, relative: &str, contents: &str) {
            let path = self.path(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }

        fn config(&self) -> Config {
            Config {
                proc_root: self.path("proc"),
                ..Config::default()
            }
        }

        fn detect(&self) -> Detection {
            let config = self.config();
            determine_type(
                &config.proc_cgroups(),
                &config.proc_self_cgroup(),
                &config.proc_self_mountinfo(),
            )
        }

        fn create(&self) -> Result<CgroupSubsystem> {
            create_with(&self.config(), HOST, Arc::new(ManualClock::default()))
        }

        fn v1_layout(&self, skip_mount: Option<&str>) {
            self.write("proc/cgroups", V1_CGROUPS);
            let mut mountinfo =
                String::from("25 30 0:23 / /proc rw,relatime - proc proc rw\n");
            let hierarchies = ["cpuset", "cpu,cpuacct", "memory", "pids"];
            for (id, controllers) in hierarchies.iter().enumerate() {
                if skip_mount == Some(*controllers) {
                    continue;
                }
                let mount_point = self.mount(&format!("sys/fs/cgroup/{controllers}"));
                mountinfo.push_str(&format!(
                    "{} 25 0:{} /docker/abc {mount_point} rw,nosuid shared:{id} - cgroup cgroup rw,{controllers}\n",
                    40 + id,
                    30 + id,
                ));
            }
            self.write("proc/self/mountinfo", &mountinfo);
            self.write(
                "proc/self/cgroup",
                "\
7:pids:/docker/abc
5:memory:/docker/abc
3:cpu,cpuacct:/docker/abc
2:cpuset:/docker/abc
1:name=systemd:/docker/abc
",
            );
        }

        fn v2_layout(&self) {
            self.write("proc/cgroups", V2_CGROUPS);
            let mount_point = self.mount("sys/fs/cgroup");
            self.mount("sys/fs/cgroup/kubepods/pod1");
            self.write(
                "proc/self/mountinfo",
                &format!(
                    "30 25 0:26 / {mount_point} rw,nosuid,nodev shared:4 - cgroup2 cgroup2 rw,nsdelegate\n"
                ),
            );
            self.write("proc/self/cgroup", "0::/kubepods/pod1\n");
        }
    }

    #[test]
    fn test_detects_v1() {
        let host = FakeHost::new();
        host.v1_layout(None);

        let detection = host.detect();
        assert_eq!(detection.version, CgroupVersion::V1);
        for kind in ControllerKind::ALL {
            let info = detection.info(kind);
            assert!(info.enabled, "{}", info.name);
            assert!(info.data_complete, "{}", info.name);
            assert_eq!(info.cgroup_path.as_deref(), Some("/docker/abc"));
            assert_eq!(info.root_mount_path.as_deref(), Some("/docker/abc"));
        }
        assert_eq!(detection.info(ControllerKind::Memory).hierarchy_id, Some(5));
        assert!(
            detection
                .infos
                .iter()
                .any(|info| matches!(info.hierarchy_id, Some(id) if id != 0))
        );
        assert_eq!(
            detection.info(ControllerKind::Cpu).mount_path,
            detection.info(ControllerKind::Cpuacct).mount_path
        );
    }

    #[test]
    fn test_creates_v1_subsystem() {
        let host = FakeHost::new();
        host.v1_layout(None);
        host.write("sys/fs/cgroup/memory/memory.limit_in_bytes", "536870912\n");
        host.write("sys/fs/cgroup/cpu,cpuacct/cpu.cfs_quota_us", "200000\n");
        host.write("sys/fs/cgroup/cpu,cpuacct/cpu.cfs_period_us", "100000\n");
        host.write("sys/fs/cgroup/cpuset/cpuset.cpus", "0-1\n");
        host.write("sys/fs/cgroup/pids/pids.max", "max\n");
        host.write("sys/fs/cgroup/pids/pids.current", "3\n");

        let subsystem = host.create().unwrap();
        assert_eq!(subsystem.version(), CgroupVersion::V1);
        assert_eq!(subsystem.container_type(), "cgroupv1");
        assert_eq!(subsystem.memory_limit(), 536_870_912);
        assert_eq!(subsystem.active_processor_count(), 2);
        assert_eq!(subsystem.cpu_cpuset_cpus().as_deref(), Some("0-1"));
        assert_eq!(subsystem.pids_max(), UNKNOWN);
        assert_eq!(subsystem.pids_current(), 3);
        assert_eq!(
            subsystem.memory_controller().controller().subsystem_path(),
            Some(host.path("sys/fs/cgroup/memory").as_path())
        );
    }

    #[test]
    fn test_detects_v2() {
        let host = FakeHost::new();
        host.v2_layout();

        let detection = host.detect();
        assert_eq!(detection.version, CgroupVersion::V2);
        let memory = detection.info(ControllerKind::Memory);
        assert_eq!(memory.cgroup_path.as_deref(), Some("/kubepods/pod1"));
        assert_eq!(memory.root_mount_path.as_deref(), Some("/"));
    }

    #[test]
    fn test_creates_v2_subsystem() {
        let host = FakeHost::new();
        host.v2_layout();
        host.write("sys/fs/cgroup/kubepods/pod1/memory.max", "1073741824\n");
        host.write("sys/fs/cgroup/kubepods/pod1/cpu.max", "max 100000\n");
        host.write("sys/fs/cgroup/kubepods/pod1/cpu.weight", "79\n");
        host.write("sys/fs/cgroup/kubepods/pod1/pids.max", "512\n");

        let subsystem = host.create().unwrap();
        assert_eq!(subsystem.container_type(), "cgroupv2");
        assert_eq!(subsystem.memory_limit(), 1_073_741_824);
        assert_eq!(subsystem.cpu_quota(), UNKNOWN);
        assert_eq!(subsystem.cpu_shares(), 2048);
        assert_eq!(subsystem.active_processor_count(), 2);
        assert_eq!(subsystem.pids_max(), 512);
    }

    #[test]
    fn test_missing_required_mount() {
        let host = FakeHost::new();
        host.v1_layout(Some("memory"));

        assert_eq!(host.detect().version, CgroupVersion::InvalidNoMount);
        assert!(matches!(
            host.create(),
            Err(Error::Unavailable(CgroupVersion::InvalidNoMount))
        ));
    }

    #[test]
    fn test_missing_optional_pids_mount() {
        let host = FakeHost::new();
        host.v1_layout(Some("pids"));

        let subsystem = host.create().unwrap();
        assert_eq!(subsystem.version(), CgroupVersion::V1);
        assert_eq!(subsystem.pids_max(), UNKNOWN);
    }

    #[test]
    fn test_no_cgroup_mounts() {
        let host = FakeHost::new();
        host.v1_layout(None);
        host.write(
            "proc/self/mountinfo",
            "25 30 0:23 / /proc rw,relatime - proc proc rw\n",
        );
        assert_eq!(host.detect().version, CgroupVersion::InvalidNoMount);
    }

    #[test]
    fn test_missing_process_cgroup_is_invalid_v1() {
        let host = FakeHost::new();
        host.v1_layout(None);
        host.write("proc/self/cgroup", "3:cpu,cpuacct:/docker/abc\n2:cpuset:/\n");
        assert_eq!(host.detect().version, CgroupVersion::InvalidV1);
    }

    #[test]
    fn test_disabled_required_controller() {
        let host = FakeHost::new();
        host.v1_layout(None);
        host.write("proc/cgroups", &V1_CGROUPS.replace("memory\t5\t90\t1", "memory\t5\t90\t0"));
        assert_eq!(host.detect().version, CgroupVersion::InvalidGeneric);
    }

    #[test]
    fn test_unreadable_inputs() {
        let host = FakeHost::new();
        assert_eq!(host.detect().version, CgroupVersion::InvalidGeneric);

        host.v1_layout(None);
        host.write("proc/self/mountinfo", "garbage\n");
        assert_eq!(host.detect().version, CgroupVersion::InvalidGeneric);
    }

    #[test]
    fn test_unified_ids_without_cgroup2_mount() {
        let host = FakeHost::new();
        host.v1_layout(None);
        host.write("proc/cgroups", V2_CGROUPS);
        assert_eq!(host.detect().version, CgroupVersion::InvalidV2);
    }

    #[test]
    fn test_unified_mount_without_membership() {
        let host = FakeHost::new();
        host.v2_layout();
        host.write("proc/self/cgroup", "1:name=systemd:/\n");
        assert_eq!(host.detect().version, CgroupVersion::InvalidV2);
    }

    #[test]
    fn test_version_validity() {
        assert!(CgroupVersion::V1.is_valid());
        assert!(CgroupVersion::V2.is_valid());
        assert!(!CgroupVersion::Unset.is_valid());
        assert!(!CgroupVersion::InvalidGeneric.is_valid());
        assert_eq!(CgroupVersion::InvalidNoMount.to_string(), "no cgroup mount");
    }
}
