use anyhow::Context;
use std::process::ExitCode;
use std::sync::Arc;

use volley_core::prelude::ShutdownHandle;
use volley_instruments::ReportConfig;
use volley_summary_model::{append_run_summary, RunSummary};

use crate::cli::ReporterOpt;
use crate::context::{RunnerContext, UserValuesConstraint};
use crate::definition::ScenarioDefinitionBuilder;
use crate::executor::Executor;
use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::scheduler::{RunnerHandle, Scheduler};
use crate::shutdown::start_shutdown_listener;
use crate::vu::{run_vu, VuHooks};

/// The result of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    /// Whether every check met the pass threshold.
    pub passed: bool,
}

impl RunOutcome {
    /// Zero if every check met the pass threshold, one otherwise.
    pub fn exit_code(&self) -> ExitCode {
        if self.passed {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(1)
        }
    }
}

/// Run a scenario to completion.
///
/// Runs the global setup, ramps virtual users up and down according to the stages until the run
/// duration elapses or Ctrl-C is received, then runs the global teardown. The run summary is
/// printed to stdout as JSON.
///
/// Errors are returned for invalid configuration or a failing global setup, before any virtual
/// user starts. Failures inside iterations are only ever recorded in the summary.
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunOutcome> {
    let definition = definition.build()?;

    let run_id = definition
        .run_id
        .clone()
        .unwrap_or_else(|| nanoid::nanoid!());
    log::info!("Running scenario: {} with run id {}", definition.name, run_id);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = ShutdownHandle::new();
    start_shutdown_listener(runtime.handle(), shutdown_handle.clone());

    let mut report_config = ReportConfig::default();
    if definition.reporter == ReporterOpt::InMemory {
        report_config = report_config.enable_summary();
    }
    if let Some(path) = &definition.results_file {
        report_config = report_config.enable_results_file(path.clone());
    }
    let reporter = Arc::new(report_config.init(runtime.handle())?);
    let executor = Arc::new(Executor::new(runtime));

    let mut runner_context =
        RunnerContext::new(executor.clone(), reporter.clone(), shutdown_handle.clone());

    if let Some(setup_fn) = definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    let mut summary = RunSummary::new(
        run_id,
        definition.name.clone(),
        chrono::Utc::now().timestamp(),
        definition.schedule.run_duration().map(|d| d.as_secs()),
        definition.schedule.stages().to_summary(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    for key in &definition.capture_env {
        if let Ok(value) = std::env::var(key) {
            summary.add_env(key.clone(), value);
        }
    }
    log::info!("Run fingerprint: {}", summary.fingerprint());

    // Stops the progress and monitor threads however the run ends.
    let run_finished = ShutdownHandle::new();
    if !definition.no_progress {
        start_progress(definition.schedule.clone(), run_finished.new_listener())?;
    }
    start_monitor(run_finished.new_listener())?;

    let runner_context = Arc::new(runner_context);
    let hooks = VuHooks {
        setup: definition.setup_vu_fn,
        behaviour: definition.vu_behaviour,
        teardown: definition.teardown_vu_fn,
    };
    let iteration_pause = definition.iteration_pause;

    let vu_runner_context = runner_context.clone();
    let mut scheduler = Scheduler::new(definition.schedule, definition.tick, move |id| {
        let runner_context = vu_runner_context.clone();
        RunnerHandle::start(id, move |stop| {
            run_vu(
                format!("vu-{id}"),
                runner_context,
                hooks,
                iteration_pause,
                stop,
            )
        })
    });
    if let Some(interval) = definition.report_interval {
        scheduler = scheduler.with_live_report(reporter.clone(), interval);
    }

    let schedule_report = scheduler.run(&executor, shutdown_handle.new_listener());
    run_finished.shutdown();

    if let Some(teardown_fn) = definition.teardown_fn {
        // Don't crash the runner if the teardown fails. We still want the reporting and runner
        // shutdown to happen cleanly. The hook is documented as 'best effort'
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {:?}", e);
        }
    }

    let aggregate = reporter.finalize();
    let passed = aggregate.meets_threshold(definition.pass_threshold);
    for check in aggregate.checks_below_threshold(definition.pass_threshold) {
        log::warn!(
            "Check [{}] passed {:.2}% of {} evaluations, below the threshold of {:.2}%",
            check.name,
            check.pass_rate * 100.0,
            check.total(),
            definition.pass_threshold * 100.0
        );
    }

    summary.set_runner_counts(schedule_report.peak_runners, schedule_report.runners_started);
    summary.set_aggregate(aggregate);

    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?
    );

    if let Some(path) = definition.run_summary_path {
        append_run_summary(&summary, path).context("Failed to write run summary")?;
    }

    Ok(RunOutcome { summary, passed })
}
