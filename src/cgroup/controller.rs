use std::path::{Path, PathBuf};

use crate::error::ResultTraceExt;

use super::path::ControllerPath;
use super::reader::{self, Limit, TupleValue};
use super::{ReadError, Result, UNKNOWN};

/// Converts a kernel counter to the signed metric representation.
pub(crate) fn to_metric(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Maps a limit to a metric, with [`Limit::Unlimited`] becoming [`UNKNOWN`].
pub(crate) fn limit_to_metric(limit: Limit) -> i64 {
    match limit {
        Limit::Value(value) => to_metric(value),
        Limit::Unlimited => UNKNOWN,
    }
}

/// A directory of control files together with the readers for them.
///
/// Shared by every version specific controller.
#[derive(Debug, Clone)]
pub struct CgroupController {
    location: ControllerPath,
    max_line_len: usize,
}

impl CgroupController {
    pub fn new(location: ControllerPath, max_line_len: usize) -> Self {
        Self {
            location,
            max_line_len,
        }
    }

    /// The resolved subsystem directory, `None` if the controller is unusable.
    pub fn subsystem_path(&self) -> Option<&Path> {
        self.location.path()
    }

    pub fn location(&self) -> &ControllerPath {
        &self.location
    }

    fn file(&self, filename: &str) -> Result<PathBuf> {
        self.subsystem_path()
            .map(|dir| dir.join(filename))
            .ok_or(ReadError::Unusable)
    }

    fn first_line(&self, filename: &str) -> Result<(PathBuf, String)> {
        let path = self.file(filename)?;
        let line = reader::read_first_line(&path, self.max_line_len)?;
        Ok((path, line))
    }

    /// Reads a file holding a single unsigned number.
    pub fn read_number(&self, filename: &str) -> Result<u64> {
        let (path, line) = self.first_line(filename)?;
        reader::parse_number(&reader::single_token(&line, &path)?, &path)
    }

    /// Reads a file holding a single signed number.
    pub fn read_signed(&self, filename: &str) -> Result<i64> {
        let (path, line) = self.first_line(filename)?;
        reader::parse_signed(&reader::single_token(&line, &path)?, &path)
    }

    /// Reads a file holding a single limit, see [`reader::parse_limit`].
    pub fn read_limit(&self, filename: &str, upper_bound: u64) -> Result<Limit> {
        let (path, line) = self.first_line(filename)?;
        reader::parse_limit(&reader::single_token(&line, &path)?, upper_bound, &path)
    }

    /// Reads a file holding a single string token.
    pub fn read_string(&self, filename: &str) -> Result<String> {
        let (path, line) = self.first_line(filename)?;
        reader::single_token(&line, &path)
    }

    /// Reads one token of a two-token file such as `cpu.max`.
    pub fn read_tuple(&self, filename: &str, value: TupleValue) -> Result<String> {
        let (path, line) = self.first_line(filename)?;
        reader::tuple_token(&line, value, &path)
    }

    /// Reads one token of a two-token file as an unsigned number.
    pub fn read_tuple_number(&self, filename: &str, value: TupleValue) -> Result<u64> {
        let (path, line) = self.first_line(filename)?;
        reader::parse_number(&reader::tuple_token(&line, value, &path)?, &path)
    }

    /// Reads one token of a two-token file as a limit, see [`reader::parse_limit`].
    pub fn read_tuple_limit(
        &self,
        filename: &str,
        value: TupleValue,
        upper_bound: u64,
    ) -> Result<Limit> {
        let (path, line) = self.first_line(filename)?;
        reader::parse_limit(&reader::tuple_token(&line, value, &path)?, upper_bound, &path)
    }

    /// Reads the value of `key` from a key/value file such as `memory.stat`.
    pub fn read_key_value(&self, filename: &str, key: &str) -> Result<u64> {
        let path = self.file(filename)?;
        reader::read_key_value(&path, key, self.max_line_len)
    }

    /// [`read_number`](Self::read_number) as a metric, [`UNKNOWN`] on failure.
    pub(crate) fn number_metric(&self, filename: &str, what: &str) -> i64 {
        self.read_number(filename)
            .traced(what)
            .map_or(UNKNOWN, to_metric)
    }

    /// [`read_key_value`](Self::read_key_value) as a metric, [`UNKNOWN`] on failure.
    pub(crate) fn key_value_metric(&self, filename: &str, key: &str, what: &str) -> i64 {
        self.read_key_value(filename, key)
            .traced(what)
            .map_or(UNKNOWN, to_metric)
    }

    /// [`read_limit`](Self::read_limit) as a metric; unlimited and failures are [`UNKNOWN`].
    pub(crate) fn limit_metric(&self, filename: &str, upper_bound: u64, what: &str) -> i64 {
        self.read_limit(filename, upper_bound)
            .traced(what)
            .map_or(UNKNOWN, limit_to_metric)
    }
}

/// CPU limits of a cgroup.
///
/// Every value is [`UNKNOWN`] when unset or unreadable.
pub trait CpuController {
    /// CPU time (µs) the group may use per period, [`UNKNOWN`] if unbounded.
    fn cpu_quota(&self) -> i64;
    /// Length (µs) of the quota enforcement period.
    fn cpu_period(&self) -> i64;
    /// Relative CPU weight on the cgroup v1 scale, [`UNKNOWN`] when left at the default.
    fn cpu_shares(&self) -> i64;
    fn subsystem_path(&self) -> Option<&Path>;
}

/// Memory limits and usage of a cgroup, in bytes.
///
/// Limits take the host's ceilings: a limit at or above the host's value is no
/// effective limit and reported as [`UNKNOWN`].
pub trait MemoryController {
    fn memory_limit(&self, upper_bound: u64) -> i64;
    fn memory_usage(&self) -> i64;
    fn memory_and_swap_limit(&self, host_mem: u64, host_swap: u64) -> i64;
    fn memory_and_swap_usage(&self, host_mem: u64, host_swap: u64) -> i64;
    fn memory_soft_limit(&self, upper_bound: u64) -> i64;
    fn memory_max_usage(&self) -> i64;
    fn rss_usage(&self) -> i64;
    fn cache_usage(&self) -> i64;
    fn subsystem_path(&self) -> Option<&Path>;
}

/// Process count limits. `pids.max` and `pids.current` are named the same in both
/// versions.
#[derive(Debug, Clone)]
pub struct CgroupPidsController {
    base: CgroupController,
}

impl CgroupPidsController {
    pub fn new(base: CgroupController) -> Self {
        Self { base }
    }

    /// Maximum number of tasks, [`UNKNOWN`] if unlimited or unreadable.
    pub fn pids_max(&self) -> i64 {
        self.base.limit_metric("pids.max", u64::MAX, "Maximum number of tasks")
    }

    /// Current number of tasks.
    pub fn pids_current(&self) -> i64 {
        self.base
            .number_metric("pids.current", "Current number of tasks")
    }

    pub fn subsystem_path(&self) -> Option<&Path> {
        self.base.subsystem_path()
    }
}

/// Cpuset assignment of a cgroup.
#[derive(Debug, Clone)]
pub struct CgroupCpusetController {
    base: CgroupController,
    effective_fallback: bool,
}

impl CgroupCpusetController {
    /// `effective_fallback` consults `cpuset.*.effective` when the configured set is
    /// empty, which is the common case on the unified hierarchy.
    pub fn new(base: CgroupController, effective_fallback: bool) -> Self {
        Self {
            base,
            effective_fallback,
        }
    }

    /// CPUs the group may run on, e.g. `0-3`.
    pub fn cpus(&self) -> Option<String> {
        self.read_set("cpuset.cpus", "cpuset.cpus.effective", "cpuset.cpus")
    }

    /// Memory nodes the group may allocate from.
    pub fn mems(&self) -> Option<String> {
        self.read_set("cpuset.mems", "cpuset.mems.effective", "cpuset.mems")
    }

    fn read_set(&self, filename: &str, effective: &str, what: &str) -> Option<String> {
        match self.base.read_string(filename).traced(what) {
            Some(set) => Some(set),
            None if self.effective_fallback => self.base.read_string(effective).traced(effective),
            None => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Creates a usable controller over a fresh temporary directory.
    pub(crate) fn temp_controller() -> (tempfile::TempDir, CgroupController) {
        let dir = tempfile::tempdir().unwrap();
        let mount_point = dir.path().to_str().unwrap().to_owned();
        let controller = CgroupController::new(ControllerPath::new("/", mount_point, "/"), 1024);
        (dir, controller)
    }

    pub(crate) fn write(dir: &tempfile::TempDir, name: &str, contents: &str) {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }

    #[test]
    fn test_unusable_controller_reads_fail() {
        let controller =
            CgroupController::new(ControllerPath::new("/elsewhere", "/sys/fs/cgroup", "/"), 1024);
        assert!(controller.subsystem_path().is_none());
        assert!(matches!(
            controller.read_number("memory.usage_in_bytes"),
            Err(ReadError::Unusable)
        ));
        assert_eq!(controller.number_metric("memory.usage_in_bytes", "usage"), UNKNOWN);
    }

    #[test]
    fn test_read_helpers() {
        let (dir, controller) = temp_controller();
        write(&dir, "number", "4096\n");
        write(&dir, "signed", "-1\n");
        write(&dir, "limit", "max\n");
        write(&dir, "tuple", "50000 100000\n");
        write(&dir, "stat", "cache 1\nrss 2\n");

        assert_eq!(controller.read_number("number").unwrap(), 4096);
        assert_eq!(controller.read_signed("signed").unwrap(), -1);
        assert_eq!(controller.read_limit("limit", 10).unwrap(), Limit::Unlimited);
        assert_eq!(controller.read_string("number").unwrap(), "4096");
        assert_eq!(
            controller.read_tuple("tuple", TupleValue::Second).unwrap(),
            "100000"
        );
        assert_eq!(
            controller
                .read_tuple_number("tuple", TupleValue::First)
                .unwrap(),
            50_000
        );
        assert_eq!(controller.read_key_value("stat", "rss").unwrap(), 2);
        assert!(matches!(
            controller.read_number("missing"),
            Err(ReadError::FileOpen(_))
        ));
    }

    #[test]
    fn test_tuple_errors_carry_full_path() {
        let (dir, controller) = temp_controller();
        write(&dir, "cpu.max", "lots 100000\n");

        let err = controller
            .read_tuple_limit("cpu.max", TupleValue::First, u64::MAX)
            .unwrap_err();
        match err {
            ReadError::FormatMismatch { path, content } => {
                assert_eq!(path, dir.path().join("cpu.max"));
                assert_eq!(content, "lots");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            controller
                .read_tuple_limit("cpu.max", TupleValue::Second, u64::MAX)
                .unwrap(),
            Limit::Value(100_000)
        );
    }

    #[test]
    fn test_pids_controller() {
        let (dir, controller) = temp_controller();
        let pids = CgroupPidsController::new(controller);
        write(&dir, "pids.max", "max\n");
        write(&dir, "pids.current", "17\n");
        assert_eq!(pids.pids_max(), UNKNOWN);
        assert_eq!(pids.pids_current(), 17);

        write(&dir, "pids.max", "4096\n");
        assert_eq!(pids.pids_max(), 4096);
    }

    #[test]
    fn test_cpuset_effective_fallback() {
        let (dir, controller) = temp_controller();
        write(&dir, "cpuset.cpus", "\n");
        write(&dir, "cpuset.cpus.effective", "0-3\n");
        write(&dir, "cpuset.mems", "0\n");

        let with_fallback = CgroupCpusetController::new(controller.clone(), true);
        assert_eq!(with_fallback.cpus().as_deref(), Some("0-3"));
        assert_eq!(with_fallback.mems().as_deref(), Some("0"));

        let without_fallback = CgroupCpusetController::new(controller, false);
        assert_eq!(without_fallback.cpus(), None);
    }
}
