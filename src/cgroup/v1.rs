//! Controllers for the cgroup v1 (legacy) hierarchies.
//!
//! Each controller is mounted on its own hierarchy, e.g. `/sys/fs/cgroup/memory`.
//! "No limit" is reported as a huge page-aligned number (`9223372036854771712`) or,
//! for the CFS quota, as `-1`.

use std::path::Path;

use crate::error::ResultTraceExt;

use super::controller::{
    CgroupController, CpuController, MemoryController, limit_to_metric, to_metric,
};
use super::reader::Limit;
use super::{PER_CPU_SHARES, UNKNOWN};

/// CPU controller reading `cpu.cfs_quota_us`, `cpu.cfs_period_us` and `cpu.shares`.
#[derive(Debug, Clone)]
pub struct CgroupV1CpuController {
    base: CgroupController,
}

impl CgroupV1CpuController {
    pub fn new(base: CgroupController) -> Self {
        Self { base }
    }
}

impl CpuController for CgroupV1CpuController {
    fn cpu_quota(&self) -> i64 {
        self.base
            .read_signed("cpu.cfs_quota_us")
            .traced("CPU Quota")
            .map_or(UNKNOWN, |quota| if quota < 0 { UNKNOWN } else { quota })
    }

    fn cpu_period(&self) -> i64 {
        self.base.number_metric("cpu.cfs_period_us", "CPU Period")
    }

    fn cpu_shares(&self) -> i64 {
        // 1024 is the kernel default and means no shares were configured.
        match self.base.number_metric("cpu.shares", "CPU Shares") {
            PER_CPU_SHARES => UNKNOWN,
            shares => shares,
        }
    }

    fn subsystem_path(&self) -> Option<&Path> {
        self.base.subsystem_path()
    }
}

/// Memory controller reading the `memory.*` files of the v1 memory hierarchy.
#[derive(Debug, Clone)]
pub struct CgroupV1MemoryController {
    base: CgroupController,
}

impl CgroupV1MemoryController {
    pub fn new(base: CgroupController) -> Self {
        Self { base }
    }

    /// Reads `filename`, consulting `hierarchical_key` of `memory.stat` when the
    /// group itself is unlimited; a parent cgroup may still impose a limit.
    fn read_hierarchical_limit(
        &self,
        filename: &str,
        hierarchical_key: &str,
        upper_bound: u64,
        what: &str,
    ) -> Option<Limit> {
        match self.base.read_limit(filename, upper_bound).traced(what)? {
            Limit::Value(value) => Some(Limit::Value(value)),
            Limit::Unlimited => {
                let hierarchical = self
                    .base
                    .read_key_value("memory.stat", hierarchical_key)
                    .traced(hierarchical_key);
                Some(match hierarchical {
                    Some(value) if value < upper_bound => Limit::Value(value),
                    _ => Limit::Unlimited,
                })
            }
        }
    }

    fn read_swappiness(&self) -> Option<u64> {
        self.base.read_number("memory.swappiness").traced("Swappiness")
    }
}

impl MemoryController for CgroupV1MemoryController {
    fn memory_limit(&self, upper_bound: u64) -> i64 {
        self.read_hierarchical_limit(
            "memory.limit_in_bytes",
            "hierarchical_memory_limit",
            upper_bound,
            "Memory Limit",
        )
        .map_or(UNKNOWN, limit_to_metric)
    }

    fn memory_usage(&self) -> i64 {
        self.base
            .number_metric("memory.usage_in_bytes", "Memory Usage")
    }

    fn memory_and_swap_limit(&self, host_mem: u64, host_swap: u64) -> i64 {
        let memsw = self.read_hierarchical_limit(
            "memory.memsw.limit_in_bytes",
            "hierarchical_memsw_limit",
            host_mem.saturating_add(host_swap),
            "Memory and Swap Limit",
        );

        match memsw {
            None => {
                log::trace!(
                    target: "cgroup",
                    "Memory and Swap Limit has been reset to the memory limit because swap is not supported"
                );
                self.memory_limit(host_mem)
            }
            Some(Limit::Unlimited) => UNKNOWN,
            Some(Limit::Value(limit)) => {
                if self.read_swappiness() == Some(0) {
                    log::trace!(
                        target: "cgroup",
                        "Memory and Swap Limit has been reset to the memory limit because swappiness is 0"
                    );
                    self.memory_limit(host_mem)
                } else {
                    to_metric(limit)
                }
            }
        }
    }

    fn memory_and_swap_usage(&self, host_mem: u64, host_swap: u64) -> i64 {
        let memsw_limit = self.memory_and_swap_limit(host_mem, host_swap);
        let memory_limit = self.memory_limit(host_mem);
        if memsw_limit > 0 && memory_limit > 0 && memsw_limit > memory_limit {
            return self
                .base
                .number_metric("memory.memsw.usage_in_bytes", "Memory and Swap Usage");
        }
        self.memory_usage()
    }

    fn memory_soft_limit(&self, upper_bound: u64) -> i64 {
        self.base.limit_metric(
            "memory.soft_limit_in_bytes",
            upper_bound,
            "Memory Soft Limit",
        )
    }

    fn memory_max_usage(&self) -> i64 {
        self.base
            .number_metric("memory.max_usage_in_bytes", "Maximum Memory Usage")
    }

    fn rss_usage(&self) -> i64 {
        self.base.key_value_metric("memory.stat", "rss", "RSS Usage")
    }

    fn cache_usage(&self) -> i64 {
        self.base
            .key_value_metric("memory.stat", "cache", "Cache Usage")
    }

    fn subsystem_path(&self) -> Option<&Path> {
        self.base.subsystem_path()
    }
}
