use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use volley_core::prelude::ConfigurationError;

use crate::cli::{ReporterOpt, VolleyScenarioCli};
use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use crate::stage::{RampSchedule, Stage, StageSequence};

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type VuHookMut<RV, V> = fn(&mut VuContext<RV, V>) -> HookResult;

const DEFAULT_ITERATION_PAUSE: Duration = Duration::from_secs(1);

/// The scheduler has to tick at least once an hour.
const MAX_TICK_MS: u64 = 60 * 60 * 1000;

/// The builder for a scenario definition.
///
/// This must be used at the start of a test to define the scenario that you want to run.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// This value is initialised for you and you cannot change it.
    #[doc(hidden)]
    cli: VolleyScenarioCli,
    /// The stages to use when none are given on the command line.
    default_stages: Vec<Stage>,
    /// The pause between iterations of each virtual user, when not given on the command line.
    default_iteration_pause: Duration,
    /// Environment variables to record in the run summary.
    capture_env: BTreeSet<String>,
    /// Global setup hook for this scenario. It will be run once, before any virtual users are started.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Setup hook for a virtual user, which will be run once for each virtual user as it starts.
    ///
    /// If it fails then that virtual user stops without running its behaviour. The rest of the
    /// run is not affected.
    setup_vu_fn: Option<VuHookMut<RV, V>>,
    /// The behaviour that every virtual user runs once per iteration.
    vu_behaviour: Option<VuHookMut<RV, V>>,
    /// Teardown hook for a virtual user, which runs once when it stops.
    teardown_vu_fn: Option<VuHookMut<RV, V>>,
    /// Global teardown hook for this scenario. It runs once, after every virtual user has
    /// stopped and before the summary is produced. It is best effort, a failure is logged but
    /// does not fail the run.
    teardown_fn: Option<GlobalHook<RV>>,
}

pub(crate) struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) name: String,
    pub(crate) schedule: RampSchedule,
    pub(crate) tick: Duration,
    pub(crate) iteration_pause: Duration,
    pub(crate) pass_threshold: f64,
    pub(crate) reporter: ReporterOpt,
    pub(crate) results_file: Option<PathBuf>,
    pub(crate) run_summary_path: Option<PathBuf>,
    pub(crate) run_id: Option<String>,
    pub(crate) no_progress: bool,
    pub(crate) report_interval: Option<Duration>,
    pub(crate) capture_env: BTreeSet<String>,
    pub(crate) setup_fn: Option<GlobalHookMut<RV>>,
    pub(crate) setup_vu_fn: Option<VuHookMut<RV, V>>,
    pub(crate) vu_behaviour: VuHookMut<RV, V>,
    pub(crate) teardown_vu_fn: Option<VuHookMut<RV, V>>,
    pub(crate) teardown_fn: Option<GlobalHook<RV>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Initialise a new scenario definition from the scenario name and command line arguments.
    /// See the [ScenarioDefinitionBuilder::name] for more information about the name.
    pub fn new(name: &str, cli: VolleyScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            default_stages: Vec::new(),
            default_iteration_pause: DEFAULT_ITERATION_PAUSE,
            capture_env: BTreeSet::new(),
            setup_fn: None,
            setup_vu_fn: None,
            vu_behaviour: None,
            teardown_vu_fn: None,
            teardown_fn: None,
        }
    }

    /// Initialise logging and parse the command line, then create the builder.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, crate::init::init())
    }

    /// Set the stages that are used unless the command line gives its own.
    pub fn with_default_stages(mut self, stages: Vec<Stage>) -> Self {
        self.default_stages = stages;
        self
    }

    /// Set the pause between iterations that is used unless the command line gives its own.
    pub fn with_default_iteration_pause(mut self, pause: Duration) -> Self {
        self.default_iteration_pause = pause;
        self
    }

    /// Record the value of this environment variable in the run summary. Variables that are
    /// not set are skipped.
    pub fn add_capture_env(mut self, key: &str) -> Self {
        self.capture_env.insert(key.to_string());
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the virtual user setup hook [ScenarioDefinitionBuilder::setup_vu_fn] for this scenario.
    pub fn use_vu_setup(mut self, setup_vu_fn: VuHookMut<RV, V>) -> Self {
        self.setup_vu_fn = Some(setup_vu_fn);
        self
    }

    /// Set the virtual user behaviour [ScenarioDefinitionBuilder::vu_behaviour] for this scenario.
    pub fn use_vu_behaviour(mut self, behaviour: VuHookMut<RV, V>) -> Self {
        self.vu_behaviour = Some(behaviour);
        self
    }

    /// Set the virtual user teardown hook [ScenarioDefinitionBuilder::teardown_vu_fn] for this scenario.
    pub fn use_vu_teardown(mut self, teardown_vu_fn: VuHookMut<RV, V>) -> Self {
        self.teardown_vu_fn = Some(teardown_vu_fn);
        self
    }

    /// Set the global teardown hook [ScenarioDefinitionBuilder::teardown_fn] for this scenario.
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    pub(crate) fn build(self) -> anyhow::Result<ScenarioDefinition<RV, V>> {
        let vu_behaviour = self.vu_behaviour.ok_or_else(|| {
            ConfigurationError::new("behaviour", "the scenario must set a virtual user behaviour")
        })?;

        let stages = if self.cli.stages.is_empty() {
            self.default_stages
        } else {
            self.cli.stages
        };
        let stages = StageSequence::new(stages)?;

        let run_duration = if self.cli.soak {
            None
        } else {
            Some(
                self.cli
                    .duration
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| stages.total_duration()),
            )
        };

        if !(1..=MAX_TICK_MS).contains(&self.cli.tick_ms) {
            return Err(ConfigurationError::new(
                "tick-ms",
                format!("must be between 1 and {MAX_TICK_MS}"),
            )
            .into());
        }

        let iteration_pause = self
            .cli
            .iteration_pause_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_iteration_pause);

        Ok(ScenarioDefinition {
            name: self.name,
            schedule: RampSchedule::with_run_duration(stages, run_duration),
            tick: Duration::from_millis(self.cli.tick_ms),
            iteration_pause,
            pass_threshold: self.cli.pass_threshold,
            reporter: self.cli.reporter,
            results_file: self.cli.results_file,
            run_summary_path: self.cli.run_summary_path,
            run_id: self.cli.run_id,
            no_progress: self.cli.no_progress,
            report_interval: match self.cli.report_interval_s {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            capture_env: self.capture_env,
            setup_fn: self.setup_fn,
            setup_vu_fn: self.setup_vu_fn,
            vu_behaviour,
            teardown_vu_fn: self.teardown_vu_fn,
            teardown_fn: self.teardown_fn,
        })
    }
}
