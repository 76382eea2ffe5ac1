use crate::cli::VolleyScenarioCli;
use clap::Parser;

/// Initialise the CLI and logging for the volley runner.
pub fn init() -> VolleyScenarioCli {
    env_logger::init();

    VolleyScenarioCli::parse()
}
