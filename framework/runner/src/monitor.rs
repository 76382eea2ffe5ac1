use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use volley_core::prelude::DelegatedShutdownListener;

/// CPU usage, as a percentage of all cores, above which the load generator is considered busy
/// enough to distort latency measurements.
const HIGH_CPU_PERCENT: f32 = 80.0;

/// Monitor the resource usage of the volley process and report high usage.
///
/// Note that this won't stop the test proceeding, it will just log a warning to the user know that
/// their latency figures might be inflated by the load generator itself being saturated.
///
/// The CPU usage for the process is collected every [sysinfo::MINIMUM_CPU_UPDATE_INTERVAL] and checked.
pub(crate) fn start_monitor(shutdown_listener: DelegatedShutdownListener) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let this_process_pid = Pid::from_u32(std::process::id());
            let mut sys = System::new();

            sys.refresh_cpu_all();
            let cpu_count = sys.cpus().len().max(1);

            loop {
                if shutdown_listener.should_shutdown() {
                    break;
                }

                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[this_process_pid]),
                    true,
                    ProcessRefreshKind::nothing().with_cpu(),
                );

                let Some(process) = sys.process(this_process_pid) else {
                    log::debug!("Process info unavailable, stopping the resource monitor");
                    break;
                };

                let usage = process.cpu_usage() / cpu_count as f32;
                if usage > HIGH_CPU_PERCENT {
                    log::warn!(
                        "High CPU usage detected. Volley is using {usage:.2}% of the CPU, with {cpu_count} available cores"
                    );
                }

                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            }
        })?;

    Ok(())
}
