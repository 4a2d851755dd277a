//! Resource limits imposed on this process through Linux control groups.
//!
//! Detection picks between the legacy v1 hierarchies and the v2 unified hierarchy
//! and builds a [`CgroupSubsystem`] that answers CPU, memory and task count
//! queries the same way for both.
//!
//! # Key Components
//!
//! - [`create`] - Detects the layout and builds the subsystem.
//! - [`CgroupSubsystem`] - Version independent query surface.
//! - [`CpuController`] / [`MemoryController`] - Per version readers of control files.
//! - [`CachingController`] - Holds a controller plus a short-lived cache of its
//!   most frequently queried metric.
//!
//! # Conventions
//!
//! Every numeric metric uses [`UNKNOWN`] for values that are unset, unlimited
//! or unreadable. Reading a control file never panics.
mod cache;
mod controller;
mod error;
mod factory;
mod path;
mod reader;
mod subsystem;
mod v1;
mod v2;

pub use cache::{CachedMetric, CachingController, Clock, MonotonicClock};
pub use controller::{
    CgroupController, CgroupCpusetController, CgroupPidsController, CpuController,
    MemoryController,
};
pub use error::{ReadError, Result};
pub use factory::{
    CgroupInfo, CgroupVersion, ControllerKind, Detection, Error as FactoryError, create,
    create_with, determine_type,
};
pub use path::{ControllerPath, resolve_subsystem_path};
pub use reader::{Limit, TupleValue};
pub use subsystem::{
    AnyCpuController, AnyMemoryController, CgroupSubsystem, VersionSpecificInfo,
    compute_active_processor_count,
};
pub use v1::{CgroupV1CpuController, CgroupV1MemoryController};
pub use v2::{CgroupV2CpuController, CgroupV2MemoryController, weight_to_shares};

/// Sentinel for a metric that is unset, unlimited or could not be read.
pub const UNKNOWN: i64 = -1;

/// `cpu.shares` corresponding to one processor.
pub const PER_CPU_SHARES: i64 = 1024;
