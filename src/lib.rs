//! Cgroup Probe: detects the CPU and memory limits a Linux container runtime
//! imposed on the current process through cgroup v1 or v2.
//!
//! Runtimes need these numbers to size thread pools and heaps: the host's
//! processor count and physical memory overstate what a container may use.
//!
//! # Example
//!
//! ```no_run
//! match cgroup_probe::subsystem() {
//!     Some(cgroup) => println!(
//!         "{}: {} processors, memory limit {}",
//!         cgroup.container_type(),
//!         cgroup.active_processor_count(),
//!         cgroup.memory_limit(),
//!     ),
//!     None => println!("no cgroup limits"),
//! }
//! ```
use std::sync::OnceLock;

use cgroup::CgroupSubsystem;
use config::Config;

pub mod cgroup;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod mountinfo;
pub mod procfs;

/// The process-wide cgroup subsystem, detected on first use from [`Config::from_env`].
///
/// Returns `None` if the process runs without a usable cgroup configuration.
/// Detection happens at most once; later calls return the same result.
pub fn subsystem() -> Option<&'static CgroupSubsystem> {
    static SUBSYSTEM: OnceLock<Option<CgroupSubsystem>> = OnceLock::new();

    SUBSYSTEM
        .get_or_init(|| {
            match cgroup::create(&Config::from_env()) {
                Ok(subsystem) => Some(subsystem),
                Err(err) => {
                    log::info!("{err}");
                    None
                }
            }
        })
        .as_ref()
}
