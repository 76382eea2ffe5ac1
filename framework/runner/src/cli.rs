use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::stage::{parse_stage, Stage};

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct VolleyScenarioCli {
    /// Add a stage to the ramp, in the format `duration:target`. For example `--stage 30s:1000`
    /// ramps to 1000 virtual users over 30 seconds.
    ///
    /// Durations use human readable units such as `20s`, `1m` or `1m 30s`. Repeat the flag to add
    /// more stages, they run in the order given.
    ///
    /// When any stage is given, the scenario's default stages are ignored.
    #[clap(long = "stage", value_parser = parse_stage)]
    pub stages: Vec<Stage>,

    /// The number of seconds to run the scenario for.
    ///
    /// By default the run ends when the last stage does. If this is longer then the final stage
    /// target is held until the time is up, if it is shorter then the ramp is cut short.
    #[clap(long)]
    pub duration: Option<u64>,

    /// Run this test as a soak test, ignoring any configured duration and holding the final stage
    /// target until stopped
    #[clap(long, default_value = "false")]
    pub soak: bool,

    /// How often, in milliseconds, the number of running virtual users is adjusted to the ramp.
    /// At most one hour.
    #[clap(long, default_value_t = 1000)]
    pub tick_ms: u64,

    /// How long, in milliseconds, each virtual user pauses between iterations. Defaults to the
    /// scenario's own setting.
    #[clap(long)]
    pub iteration_pause_ms: Option<u64>,

    /// The fraction of evaluations, between 0 and 1, that every check must pass for the run to
    /// succeed.
    #[clap(long, default_value_t = 1.0, value_parser = parse_pass_threshold)]
    pub pass_threshold: f64,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// The reporter to use.
    #[arg(long, value_enum, default_value_t = ReporterOpt::InMemory)]
    pub reporter: ReporterOpt,

    /// Write every check result and timed operation to this file, as JSON lines.
    #[clap(long)]
    pub results_file: Option<PathBuf>,

    /// Append the run summary to this file, as a single JSON line.
    #[clap(long)]
    pub run_summary_path: Option<PathBuf>,

    /// The run ID to use. A random one is generated if not given.
    #[clap(long)]
    pub run_id: Option<String>,

    /// How often, in seconds, to log a point in time summary while the scenario runs. Zero turns
    /// it off.
    #[clap(long, default_value_t = 10)]
    pub report_interval_s: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReporterOpt {
    /// Print tables of checks and operations to stderr when the run finishes.
    InMemory,
    /// Report nothing beyond the run summary on stdout.
    Noop,
}

impl Default for VolleyScenarioCli {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            duration: None,
            soak: false,
            tick_ms: 1000,
            iteration_pause_ms: None,
            pass_threshold: 1.0,
            no_progress: false,
            reporter: ReporterOpt::InMemory,
            results_file: None,
            run_summary_path: None,
            run_id: None,
            report_interval_s: 10,
        }
    }
}

fn parse_pass_threshold(s: &str) -> anyhow::Result<f64> {
    let threshold = s.parse::<f64>()?;
    if !(0.0..=1.0).contains(&threshold) {
        anyhow::bail!("Pass threshold must be between 0 and 1, got {threshold}");
    }

    Ok(threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn defaults_match_parsed_defaults() {
        let parsed = VolleyScenarioCli::try_parse_from(["scenario"]).unwrap();
        let default = VolleyScenarioCli::default();

        assert_eq!(default.stages, parsed.stages);
        assert_eq!(default.tick_ms, parsed.tick_ms);
        assert_eq!(default.pass_threshold, parsed.pass_threshold);
        assert_eq!(default.reporter, parsed.reporter);
        assert_eq!(default.report_interval_s, parsed.report_interval_s);
    }

    #[test]
    fn parses_repeated_stages_in_order() {
        let cli = VolleyScenarioCli::try_parse_from([
            "scenario",
            "--stage",
            "30s:1000",
            "--stage",
            "1m:100",
            "--stage=20s:50",
            "--reporter",
            "noop",
        ])
        .unwrap();

        assert_eq!(
            vec![
                Stage::new(Duration::from_secs(30), 1000),
                Stage::new(Duration::from_secs(60), 100),
                Stage::new(Duration::from_secs(20), 50),
            ],
            cli.stages
        );
        assert_eq!(ReporterOpt::Noop, cli.reporter);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(VolleyScenarioCli::try_parse_from(["scenario", "--stage", "10s:-1"]).is_err());
        assert!(VolleyScenarioCli::try_parse_from(["scenario", "--stage=-10s:1"]).is_err());
        assert!(VolleyScenarioCli::try_parse_from(["scenario", "--pass-threshold", "1.5"]).is_err());
    }
}
