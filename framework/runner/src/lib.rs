mod cli;
mod context;
mod definition;
mod executor;
mod init;
mod monitor;
mod progress;
mod run;
mod scheduler;
mod shutdown;
mod stage;
mod types;
mod vu;

pub use stage::parse_stage;

pub mod prelude {
    pub use crate::cli::{ReporterOpt, VolleyScenarioCli};
    pub use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
    pub use crate::definition::{HookResult, ScenarioDefinitionBuilder};
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::run::{run, RunOutcome};
    pub use crate::scheduler::{RunnerHandle, ScheduleReport, Scheduler};
    pub use crate::stage::{RampSchedule, RampState, Stage, StageSequence};
    pub use crate::types::VolleyResult;
}
