use tokio::signal;
use volley_core::prelude::ShutdownHandle;

/// Trigger `handle` when the process receives Ctrl-C.
pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Handle, handle: ShutdownHandle) {
    runtime.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("Received shutdown signal, shutting down...");
                handle.shutdown();
            }
            Err(e) => {
                log::error!("Failed to listen for Ctrl-C, the run can only end on its own: {e}");
            }
        }
    });
}
