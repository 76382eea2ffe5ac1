use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use std::cmp::min;
use std::fmt::Write;
use std::time::{Duration, Instant};
use volley_core::prelude::DelegatedShutdownListener;

use crate::stage::RampSchedule;

/// Displays a progress bar while the test is running to show the user how long is left and how
/// many virtual users the ramp currently wants.
///
/// Nothing is shown for a soak run, which has no planned end.
pub(crate) fn start_progress(
    schedule: RampSchedule,
    shutdown_listener: DelegatedShutdownListener,
) -> anyhow::Result<()> {
    let Some(planned_runtime) = schedule.run_duration() else {
        return Ok(());
    };

    let style = ProgressStyle::with_template(
        "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}] {msg}",
    )?
    .with_key(
        "planned_runtime",
        move |_state: &ProgressState, w: &mut dyn Write| {
            let secs = planned_runtime.as_secs();
            let _ = write!(w, "{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60);
        },
    )
    .progress_chars("#>-");

    std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            let pb = ProgressBar::new(planned_runtime.as_secs());
            pb.set_style(style);

            loop {
                if shutdown_listener.should_shutdown() {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                let elapsed = start_time.elapsed();
                pb.set_position(min(elapsed.as_secs(), planned_runtime.as_secs()));
                pb.set_message(format!("target {} VUs", schedule.target_at(elapsed)));
                std::thread::sleep(Duration::from_secs(1));
            }
        })?;

    Ok(())
}
