use std::io::BufRead;
use std::num::NonZeroUsize;
use std::path::Path;

use crate::fsutil;

use super::{Error, ParseError, Result, parse_lines};

/// Host-wide resource ceilings, used as the fallback and clamp for cgroup limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostResources {
    /// Processors this process may be scheduled on.
    pub processors: u32,
    /// Physical memory in bytes.
    pub physical_memory: u64,
    /// Swap space in bytes.
    pub swap: u64,
}

impl HostResources {
    /// Discovers the host's resources below `proc_root` (normally `/proc`).
    ///
    /// Never fails: each unreadable source is logged and replaced by a fallback.
    /// Processors fall back to [`std::thread::available_parallelism`], memory to
    /// [`u64::MAX`] and swap to `0`.
    pub fn detect(proc_root: impl AsRef<Path>) -> Self {
        let proc_root = proc_root.as_ref();

        let processors = match read_allowed_cpus(proc_root.join("self/status")) {
            Ok(count) if count > 0 => count,
            Ok(_) => fallback_processors(),
            Err(err) => {
                log::debug!("Failed to read allowed cpus: {err}");
                fallback_processors()
            }
        };

        let meminfo = proc_root.join("meminfo");
        let physical_memory = read_meminfo_bytes(&meminfo, "MemTotal").unwrap_or_else(|err| {
            log::warn!("Failed to read host memory: {err}");
            u64::MAX
        });
        let swap = read_meminfo_bytes(&meminfo, "SwapTotal").unwrap_or_else(|err| {
            log::debug!("Failed to read host swap: {err}");
            0
        });

        let host = Self {
            processors,
            physical_memory,
            swap,
        };
        log::debug!("Host resources: {host:?}");
        host
    }
}

fn fallback_processors() -> u32 {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .ok()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(1)
}

fn read_allowed_cpus(path: impl AsRef<Path>) -> Result<u32> {
    let path = path.as_ref();
    let buf = fsutil::open_file_reader(path)?;
    read_allowed_cpus_from_reader(buf, path)
}

fn read_allowed_cpus_from_reader<R: BufRead>(reader: R, origin: &Path) -> Result<u32> {
    const KEY: &str = "Cpus_allowed_list:";
    let counts = parse_lines(reader, origin, |line| match line.strip_prefix(KEY) {
        Some(list) => count_cpu_list(list.trim()).map(Some),
        None => Ok(None),
    })?;

    counts.first().copied().ok_or_else(|| Error::MissingKey {
            path: origin.to_path_buf(),
            key: KEY,
        })
}

fn read_meminfo_bytes(path: &Path, key: &'static str) -> Result<u64> {
    let buf = fsutil::open_file_reader(path)?;
    read_meminfo_bytes_from_reader(buf, path, key)
}

/// Looks up `key` in a `/proc/meminfo` style file, converting `kB` values to bytes.
fn read_meminfo_bytes_from_reader<R: BufRead>(
    reader: R,
    origin: &Path,
    key: &'static str,
) -> Result<u64> {
    let values = parse_lines(reader, origin, |line| {
        let Some((name, rest)) = line.split_once(':') else {
            return Ok(None);
        };
        if name != key {
            return Ok(None);
        }

        let mut parts = rest.split_whitespace();
        let value = parts.next().unwrap_or_default();
        let value = value
            .parse::<u64>()
            .map_err(|source| ParseError::InvalidNumber {
                value: value.to_owned(),
                line: line.to_owned(),
                source,
            })?;
        let scale = match parts.next() {
            Some("kB") => 1024,
            _ => 1,
        };
        Ok(Some(value.saturating_mul(scale)))
    })?;

    values.first().copied().ok_or_else(|| Error::MissingKey {
        path: origin.to_path_buf(),
        key,
    })
}

/// Counts the cpus of a kernel cpu list such as `0-3,8,10-11`.
///
/// Overlapping and repeated entries are counted once. Only the ranges are kept in
/// memory, never the individual ids.
///
/// # Errors
///
/// Returns [`ParseError::InvalidCpuList`] for empty or malformed lists and
/// descending ranges.
///
/// # Example
///
/// ```
/// use cgroup_probe::procfs::count_cpu_list;
///
/// assert_eq!(count_cpu_list("0-2,5").unwrap(), 4);
/// ```
pub fn count_cpu_list(list: &str) -> std::result::Result<u32, ParseError> {
    let invalid = || ParseError::InvalidCpuList(list.to_owned());
    let mut ranges = Vec::new();

    for part in list.trim().split(',') {
        let (start, end) = part.split_once('-').unwrap_or((part, part));
        let start = start.trim().parse::<u32>().map_err(|_| invalid())?;
        let end = end.trim().parse::<u32>().map_err(|_| invalid())?;
        if start > end {
            return Err(invalid());
        }
        ranges.push((start, end));
    }
    ranges.sort_unstable();

    let mut count = 0u64;
    let mut covered: Option<u32> = None;
    for (start, end) in ranges {
        let start = match covered {
            Some(last) if last >= end => continue,
            Some(last) if last >= start => last + 1,
            _ => start,
        };
        count += u64::from(end - start) + 1;
        covered = Some(end);
    }
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}
