use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default grace interval between two reads of a cached metric.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(20);

/// Default upper bound for a single line read from a pseudo-file.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024;

const ENV_PROC_ROOT: &str = "CGROUP_PROBE_PROC_ROOT";
const ENV_CACHE_TIMEOUT_MS: &str = "CGROUP_PROBE_CACHE_TIMEOUT_MS";
const ENV_MAX_LINE_LEN: &str = "CGROUP_PROBE_MAX_LINE_LEN";

/// Settings for cgroup detection and metric reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the procfs used for detection, normally `/proc`.
    pub proc_root: PathBuf,
    /// Minimum time between two reads of a cached metric.
    pub cache_timeout: Duration,
    /// Longest line accepted from a control file.
    pub max_line_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl Config {
    /// Builds a configuration from the defaults, overridden by
    /// `CGROUP_PROBE_PROC_ROOT`, `CGROUP_PROBE_CACHE_TIMEOUT_MS` and
    /// `CGROUP_PROBE_MAX_LINE_LEN`.
    ///
    /// Malformed values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(root) = lookup(ENV_PROC_ROOT) {
            config.proc_root = PathBuf::from(root);
        }
        if let Some(ms) = parse_var(&lookup, ENV_CACHE_TIMEOUT_MS) {
            config.cache_timeout = Duration::from_millis(ms);
        }
        if let Some(len) = parse_var(&lookup, ENV_MAX_LINE_LEN) {
            if len > 0 {
                config.max_line_len = len;
            } else {
                log::warn!("Ignoring `{ENV_MAX_LINE_LEN}=0`");
            }
        }

        log::debug!("Using {config:?}");
        config
    }

    pub fn proc_cgroups(&self) -> PathBuf {
        self.proc_root.join("cgroups")
    }

    pub fn proc_self_cgroup(&self) -> PathBuf {
        self.proc_root.join("self/cgroup")
    }

    pub fn proc_self_mountinfo(&self) -> PathBuf {
        self.proc_root.join("self/mountinfo")
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }
}

fn parse_var<T: std::str::FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("Ignoring malformed `{key}={raw}`: {err}");
            None
        }
    }
}
