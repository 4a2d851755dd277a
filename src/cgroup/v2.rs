//! Controllers for the cgroup v2 unified hierarchy.
//!
//! All controllers share one directory. Limits use the literal `max` for "no limit".

use std::path::Path;

use crate::error::ResultTraceExt;

use super::controller::{CgroupController, CpuController, MemoryController, to_metric};
use super::reader::{Limit, TupleValue};
use super::{PER_CPU_SHARES, UNKNOWN};

/// The `cpu.weight` the kernel assigns when none was configured.
const DEFAULT_CPU_WEIGHT: u64 = 100;

/// Range of `cpu.weight` values the kernel accepts.
const CPU_WEIGHT_RANGE: std::ops::RangeInclusive<u64> = 1..=10_000;

/// CPU controller reading `cpu.max` and `cpu.weight`.
#[derive(Debug, Clone)]
pub struct CgroupV2CpuController {
    base: CgroupController,
}

impl CgroupV2CpuController {
    pub fn new(base: CgroupController) -> Self {
        Self { base }
    }
}

impl CpuController for CgroupV2CpuController {
    fn cpu_quota(&self) -> i64 {
        let quota = self
            .base
            .read_tuple_limit("cpu.max", TupleValue::First, u64::MAX)
            .traced("CPU Quota");
        match quota {
            Some(Limit::Value(quota)) => to_metric(quota),
            _ => UNKNOWN,
        }
    }

    fn cpu_period(&self) -> i64 {
        self.base
            .read_tuple_number("cpu.max", TupleValue::Second)
            .traced("CPU Period")
            .map_or(UNKNOWN, to_metric)
    }

    fn cpu_shares(&self) -> i64 {
        self.base
            .read_number("cpu.weight")
            .traced("CPU Weight")
            .map_or(UNKNOWN, weight_to_shares)
    }

    fn subsystem_path(&self) -> Option<&Path> {
        self.base.subsystem_path()
    }
}

/// Maps a `cpu.weight` in `[1, 10000]` onto the v1 `cpu.shares` range `[2, 262144]`.
///
/// Results above [`PER_CPU_SHARES`] snap to the nearest multiple of it, as the
/// scaled value is imprecise. The default weight and weights outside `[1, 10000]`
/// map to [`UNKNOWN`].
pub fn weight_to_shares(weight: u64) -> i64 {
    if weight == DEFAULT_CPU_WEIGHT {
        return UNKNOWN;
    }
    if !CPU_WEIGHT_RANGE.contains(&weight) {
        log::debug!(target: "cgroup", "CPU Weight {weight} is out of range");
        return UNKNOWN;
    }

    let scaled = (262_142 * to_metric(weight) - 1) / 9999 + 2;
    if scaled <= PER_CPU_SHARES {
        return scaled;
    }

    let lower = scaled / PER_CPU_SHARES * PER_CPU_SHARES;
    let upper = lower + PER_CPU_SHARES;
    if scaled - lower <= upper - scaled {
        lower
    } else {
        upper
    }
}

/// Memory controller reading the `memory.*` files of the unified hierarchy.
#[derive(Debug, Clone)]
pub struct CgroupV2MemoryController {
    base: CgroupController,
}

impl CgroupV2MemoryController {
    pub fn new(base: CgroupController) -> Self {
        Self { base }
    }
}

impl MemoryController for CgroupV2MemoryController {
    fn memory_limit(&self, upper_bound: u64) -> i64 {
        self.base.limit_metric("memory.max", upper_bound, "Memory Limit")
    }

    fn memory_usage(&self) -> i64 {
        self.base.number_metric("memory.current", "Memory Usage")
    }

    fn memory_and_swap_limit(&self, host_mem: u64, _host_swap: u64) -> i64 {
        let swap = self
            .base
            .read_limit("memory.swap.max", u64::MAX)
            .traced("Swap Limit");

        match swap {
            None => {
                log::trace!(
                    target: "cgroup",
                    "Memory and Swap Limit has been reset to the memory limit because swap is not supported"
                );
                self.memory_limit(host_mem)
            }
            Some(Limit::Unlimited) => UNKNOWN,
            Some(Limit::Value(swap)) => match self.memory_limit(host_mem) {
                UNKNOWN => UNKNOWN,
                memory => memory.saturating_add(to_metric(swap)),
            },
        }
    }

    fn memory_and_swap_usage(&self, _host_mem: u64, _host_swap: u64) -> i64 {
        let memory = self.memory_usage();
        if memory == UNKNOWN {
            return UNKNOWN;
        }
        match self.base.read_number("memory.swap.current").traced("Swap Usage") {
            Some(swap) => memory.saturating_add(to_metric(swap)),
            None => memory,
        }
    }

    fn memory_soft_limit(&self, upper_bound: u64) -> i64 {
        self.base
            .limit_metric("memory.low", upper_bound, "Memory Soft Limit")
    }

    fn memory_max_usage(&self) -> i64 {
        self.base.number_metric("memory.peak", "Maximum Memory Usage")
    }

    fn rss_usage(&self) -> i64 {
        self.base.key_value_metric("memory.stat", "anon", "RSS Usage")
    }

    fn cache_usage(&self) -> i64 {
        self.base.key_value_metric("memory.stat", "file", "Cache Usage")
    }

    fn subsystem_path(&self) -> Option<&Path> {
        self.base.subsystem_path()
    }
}
