use std::path::Path;

use crate::procfs::HostResources;

use super::cache::CachingController;
use super::controller::{
    CgroupCpusetController, CgroupPidsController, CpuController, MemoryController,
};
use super::v1::{CgroupV1CpuController, CgroupV1MemoryController};
use super::v2::{CgroupV2CpuController, CgroupV2MemoryController};
use super::{CgroupVersion, PER_CPU_SHARES, UNKNOWN};

/// The CPU controller of whichever hierarchy version was detected.
#[derive(Debug, Clone)]
pub enum AnyCpuController {
    V1(CgroupV1CpuController),
    V2(CgroupV2CpuController),
}

impl AnyCpuController {
    fn get(&self) -> &dyn CpuController {
        match self {
            Self::V1(c) => c,
            Self::V2(c) => c,
        }
    }
}

impl CpuController for AnyCpuController {
    fn cpu_quota(&self) -> i64 {
        self.get().cpu_quota()
    }

    fn cpu_period(&self) -> i64 {
        self.get().cpu_period()
    }

    fn cpu_shares(&self) -> i64 {
        self.get().cpu_shares()
    }

    fn subsystem_path(&self) -> Option<&Path> {
        self.get().subsystem_path()
    }
}

/// The memory controller of whichever hierarchy version was detected.
#[derive(Debug, Clone)]
pub enum AnyMemoryController {
    V1(CgroupV1MemoryController),
    V2(CgroupV2MemoryController),
}

impl AnyMemoryController {
    fn get(&self) -> &dyn MemoryController {
        match self {
            Self::V1(c) => c,
            Self::V2(c) => c,
        }
    }
}

impl MemoryController for AnyMemoryController {
    fn memory_limit(&self, upper_bound: u64) -> i64 {
        self.get().memory_limit(upper_bound)
    }

    fn memory_usage(&self) -> i64 {
        self.get().memory_usage()
    }

    fn memory_and_swap_limit(&self, host_mem: u64, host_swap: u64) -> i64 {
        self.get().memory_and_swap_limit(host_mem, host_swap)
    }

    fn memory_and_swap_usage(&self, host_mem: u64, host_swap: u64) -> i64 {
        self.get().memory_and_swap_usage(host_mem, host_swap)
    }

    fn memory_soft_limit(&self, upper_bound: u64) -> i64 {
        self.get().memory_soft_limit(upper_bound)
    }

    fn memory_max_usage(&self) -> i64 {
        self.get().memory_max_usage()
    }

    fn rss_usage(&self) -> i64 {
        self.get().rss_usage()
    }

    fn cache_usage(&self) -> i64 {
        self.get().cache_usage()
    }

    fn subsystem_path(&self) -> Option<&Path> {
        self.get().subsystem_path()
    }
}

/// Snapshot of every metric the subsystem knows about.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VersionSpecificInfo {
    pub container_type: &'static str,
    pub active_processor_count: u32,
    pub cpu_quota: i64,
    pub cpu_period: i64,
    pub cpu_shares: i64,
    pub cpuset_cpus: Option<String>,
    pub cpuset_memory_nodes: Option<String>,
    pub memory_limit: i64,
    pub memory_usage: i64,
    pub memory_and_swap_limit: i64,
    pub memory_and_swap_usage: i64,
    pub memory_soft_limit: i64,
    pub memory_max_usage: i64,
    pub rss_usage: i64,
    pub cache_usage: i64,
    pub pids_max: i64,
    pub pids_current: i64,
}

/// Uniform query surface over the detected cgroup controllers.
///
/// Every numeric accessor returns [`UNKNOWN`] when the value is unavailable or
/// unlimited; callers should fall back to host-wide values. No accessor panics.
#[derive(Debug)]
pub struct CgroupSubsystem {
    version: CgroupVersion,
    cpu: CachingController<AnyCpuController>,
    memory: CachingController<AnyMemoryController>,
    cpuset: Option<CgroupCpusetController>,
    pids: Option<CgroupPidsController>,
    host: HostResources,
}

impl CgroupSubsystem {
    pub(crate) fn new(
        version: CgroupVersion,
        cpu: CachingController<AnyCpuController>,
        memory: CachingController<AnyMemoryController>,
        cpuset: Option<CgroupCpusetController>,
        pids: Option<CgroupPidsController>,
        host: HostResources,
    ) -> Self {
        Self {
            version,
            cpu,
            memory,
            cpuset,
            pids,
            host,
        }
    }

    pub fn version(&self) -> CgroupVersion {
        self.version
    }

    pub fn host(&self) -> &HostResources {
        &self.host
    }

    /// `cgroupv1` or `cgroupv2`.
    pub fn container_type(&self) -> &'static str {
        match self.version {
            CgroupVersion::V2 => "cgroupv2",
            _ => "cgroupv1",
        }
    }

    pub fn cpu_controller(&self) -> &CachingController<AnyCpuController> {
        &self.cpu
    }

    pub fn memory_controller(&self) -> &CachingController<AnyMemoryController> {
        &self.memory
    }

    pub fn cpu_quota(&self) -> i64 {
        self.cpu.controller().cpu_quota()
    }

    pub fn cpu_period(&self) -> i64 {
        self.cpu.controller().cpu_period()
    }

    pub fn cpu_shares(&self) -> i64 {
        self.cpu.controller().cpu_shares()
    }

    /// Number of processors the container may effectively use.
    ///
    /// Derived from quota and period if both are set, otherwise from shares, and
    /// clamped to the host's processors. Cached for the configured grace interval.
    pub fn active_processor_count(&self) -> u32 {
        let host_cpus = self.host.processors;
        let count = self.cpu.cached(|cpu| {
            i64::from(compute_active_processor_count(
                cpu.cpu_quota(),
                cpu.cpu_period(),
                cpu.cpu_shares(),
                host_cpus,
            ))
        });
        u32::try_from(count).unwrap_or(host_cpus)
    }

    /// Memory limit in bytes, cached for the configured grace interval.
    pub fn memory_limit(&self) -> i64 {
        let physical = self.host.physical_memory;
        self.memory.cached(|memory| memory.memory_limit(physical))
    }

    pub fn memory_usage(&self) -> i64 {
        self.memory.controller().memory_usage()
    }

    pub fn memory_and_swap_limit(&self) -> i64 {
        self.memory
            .controller()
            .memory_and_swap_limit(self.host.physical_memory, self.host.swap)
    }

    pub fn memory_and_swap_usage(&self) -> i64 {
        self.memory
            .controller()
            .memory_and_swap_usage(self.host.physical_memory, self.host.swap)
    }

    pub fn memory_soft_limit(&self) -> i64 {
        self.memory
            .controller()
            .memory_soft_limit(self.host.physical_memory)
    }

    pub fn memory_max_usage(&self) -> i64 {
        self.memory.controller().memory_max_usage()
    }

    pub fn rss_usage(&self) -> i64 {
        self.memory.controller().rss_usage()
    }

    pub fn cache_usage(&self) -> i64 {
        self.memory.controller().cache_usage()
    }

    /// Maximum number of tasks; not cached as it may change at any time.
    pub fn pids_max(&self) -> i64 {
        self.pids.as_ref().map_or(UNKNOWN, CgroupPidsController::pids_max)
    }

    /// Current number of tasks; not cached.
    pub fn pids_current(&self) -> i64 {
        self.pids
            .as_ref()
            .map_or(UNKNOWN, CgroupPidsController::pids_current)
    }

    pub fn cpu_cpuset_cpus(&self) -> Option<String> {
        self.cpuset.as_ref().and_then(CgroupCpusetController::cpus)
    }

    pub fn cpu_cpuset_memory_nodes(&self) -> Option<String> {
        self.cpuset.as_ref().and_then(CgroupCpusetController::mems)
    }

    pub fn version_specific_info(&self) -> VersionSpecificInfo {
        VersionSpecificInfo {
            container_type: self.container_type(),
            active_processor_count: self.active_processor_count(),
            cpu_quota: self.cpu_quota(),
            cpu_period: self.cpu_period(),
            cpu_shares: self.cpu_shares(),
            cpuset_cpus: self.cpu_cpuset_cpus(),
            cpuset_memory_nodes: self.cpu_cpuset_memory_nodes(),
            memory_limit: self.memory_limit(),
            memory_usage: self.memory_usage(),
            memory_and_swap_limit: self.memory_and_swap_limit(),
            memory_and_swap_usage: self.memory_and_swap_usage(),
            memory_soft_limit: self.memory_soft_limit(),
            memory_max_usage: self.memory_max_usage(),
            rss_usage: self.rss_usage(),
            cache_usage: self.cache_usage(),
            pids_max: self.pids_max(),
            pids_current: self.pids_current(),
        }
    }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    a / b + i64::from(a % b != 0)
}

/// Effective processor count for the given CPU limits.
///
/// `quota`/`period` take precedence over `shares`; shares are scaled by
/// [`PER_CPU_SHARES`] per processor, the convention of Kubernetes, ECS and Mesos.
/// The result lies in `[1, host_cpus]`.
pub fn compute_active_processor_count(
    quota: i64,
    period: i64,
    shares: i64,
    host_cpus: u32,
) -> u32 {
    let host_cpus = host_cpus.max(1);
    let limit = if quota > 0 && period > 0 {
        Some(ceil_div(quota, period))
    } else if shares > 0 {
        Some(ceil_div(shares, PER_CPU_SHARES))
    } else {
        None
    };

    match limit {
        Some(limit) => {
            let count = u32::try_from(limit.clamp(1, i64::from(host_cpus))).unwrap_or(host_cpus);
            log::trace!(target: "cgroup", "CPU limit {limit} results in {count} active processors");
            count
        }
        None => host_cpus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::cache::ManualClock;
    use crate::cgroup::controller::CgroupController;
    use crate::cgroup::controller::tests::{temp_controller, write};
    use std::sync::Arc;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_millis(20);
    const HOST: HostResources = HostResources {
        processors: 8,
        physical_memory: 8 << 30,
        swap: 0,
    };

    fn v1_subsystem(
        cpu: CgroupController,
        memory: CgroupController,
        clock: Arc<ManualClock>,
    ) -> CgroupSubsystem {
        CgroupSubsystem::new(
            CgroupVersion::V1,
            CachingController::new(
                AnyCpuController::V1(CgroupV1CpuController::new(cpu)),
                clock.clone(),
                TIMEOUT,
            ),
            CachingController::new(
                AnyMemoryController::V1(CgroupV1MemoryController::new(memory)),
                clock,
                TIMEOUT,
            ),
            None,
            None,
            HOST,
        )
    }

    #[test]
    fn test_compute_active_processor_count() {
        assert_eq!(compute_active_processor_count(200_000, 100_000, -1, 8), 2);
        assert_eq!(compute_active_processor_count(150_000, 100_000, -1, 8), 2);
        assert_eq!(compute_active_processor_count(-1, 100_000, 2048, 8), 2);
        assert_eq!(compute_active_processor_count(-1, -1, 2048, 8), 2);
        assert_eq!(compute_active_processor_count(-1, -1, 512, 8), 1);
        assert_eq!(compute_active_processor_count(-1, -1, -1, 8), 8);
        assert_eq!(compute_active_processor_count(1_600_000, 100_000, -1, 8), 8);
        assert_eq!(compute_active_processor_count(1000, 100_000, -1, 8), 1);
        // quota wins over shares
        assert_eq!(compute_active_processor_count(400_000, 100_000, 1024 * 6, 8), 4);
    }

    #[test]
    fn test_active_processor_count_from_files() {
        let (cpu_dir, cpu) = temp_controller();
        let (_mem_dir, memory) = temp_controller();
        let clock = Arc::new(ManualClock::default());
        let subsystem = v1_subsystem(cpu, memory, clock.clone());

        assert_eq!(subsystem.active_processor_count(), 8);

        write(&cpu_dir, "cpu.cfs_quota_us", "200000\n");
        write(&cpu_dir, "cpu.cfs_period_us", "100000\n");
        assert_eq!(subsystem.active_processor_count(), 8, "cached until the timeout");

        clock.advance(TIMEOUT + Duration::from_nanos(1));
        assert_eq!(subsystem.active_processor_count(), 2);
        assert_eq!(subsystem.cpu_quota(), 200_000);
        assert_eq!(subsystem.cpu_period(), 100_000);
    }

    #[test]
    fn test_memory_limit_is_cached() {
        let (_cpu_dir, cpu) = temp_controller();
        let (mem_dir, memory) = temp_controller();
        let clock = Arc::new(ManualClock::default());
        let subsystem = v1_subsystem(cpu, memory, clock.clone());

        write(&mem_dir, "memory.limit_in_bytes", "536870912\n");
        assert_eq!(subsystem.memory_limit(), 536_870_912);

        write(&mem_dir, "memory.limit_in_bytes", "1073741824\n");
        assert_eq!(subsystem.memory_limit(), 536_870_912);
        assert!(!subsystem.memory_controller().metrics_cache().should_check());

        clock.advance(TIMEOUT + Duration::from_nanos(1));
        assert_eq!(subsystem.memory_limit(), 1_073_741_824);
    }

    #[test]
    fn test_missing_controllers_report_unknown() {
        let (_cpu_dir, cpu) = temp_controller();
        let (_mem_dir, memory) = temp_controller();
        let subsystem = v1_subsystem(cpu, memory, Arc::new(ManualClock::default()));

        assert_eq!(subsystem.container_type(), "cgroupv1");
        assert_eq!(subsystem.pids_max(), UNKNOWN);
        assert_eq!(subsystem.pids_current(), UNKNOWN);
        assert_eq!(subsystem.cpu_cpuset_cpus(), None);
        assert_eq!(subsystem.memory_usage(), UNKNOWN);

        let info = subsystem.version_specific_info();
        assert_eq!(info.container_type, "cgroupv1");
        assert_eq!(info.active_processor_count, 8);
        assert_eq!(info.memory_limit, UNKNOWN);
    }

    #[test]
    fn test_info_serializes_to_json() {
        let (_cpu_dir, cpu) = temp_controller();
        let (mem_dir, memory) = temp_controller();
        write(&mem_dir, "memory.usage_in_bytes", "4096\n");
        let subsystem = v1_subsystem(cpu, memory, Arc::new(ManualClock::default()));

        let json = serde_json::to_value(subsystem.version_specific_info()).unwrap();
        assert_eq!(json["container_type"], "cgroupv1");
        assert_eq!(json["memory_usage"], 4096);
        assert_eq!(json["cpuset_cpus"], serde_json::Value::Null);
    }
}
