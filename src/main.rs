/// Prints the cgroup limits of this process as JSON.
///
/// Set `RUST_LOG=cgroup=trace` to see every control file read. See
/// [`cgroup_probe::config::Config::from_env`] for the other variables.
///
/// # Errors
///
/// Returns an error if the report can't be serialized.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=debug CGROUP_PROBE_PROC_ROOT=/rootfs/proc cargo run
/// ```
fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let Some(cgroup) = cgroup_probe::subsystem() else {
        println!("null");
        log::warn!("No cgroup limits detected, the process is unconstrained");
        return Ok(());
    };

    let host = cgroup.host();
    log::info!(
        "Host: {} processors, {} bytes memory, {} bytes swap",
        host.processors,
        host.physical_memory,
        host.swap
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&cgroup.version_specific_info())?
    );
    Ok(())
}
