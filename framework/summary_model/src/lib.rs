mod aggregate;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::HashMap;
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

pub use aggregate::{AggregateSummary, CheckSummary, LatencySummary, OperationSummary};

/// One stage of the ramp, as it was configured for the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageSummary {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub target: usize,
}

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The duration that the run was configured with, in seconds
    ///
    /// If the run was configured for soak testing, then this will not be set.
    ///
    /// The run may have finished sooner than `started_at + run_duration` if it was interrupted.
    pub run_duration: Option<u64>,
    /// The stages that the virtual user population followed
    pub stages: Vec<StageSummary>,
    /// The largest number of virtual users that were live at the same time
    pub peak_runners: usize,
    /// The total number of virtual users started over the whole run
    pub runners_started: usize,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the ones that the scenario asked to
    /// capture.
    pub env: HashMap<String, String>,
    /// The version of Volley that was used for this run
    pub volley_version: String,
    /// The checks and timings that were reported during the run
    pub aggregate: AggregateSummary,
}

impl RunSummary {
    /// Create a new run summary
    pub fn new(
        run_id: String,
        scenario_name: String,
        started_at: i64,
        run_duration: Option<u64>,
        stages: Vec<StageSummary>,
        volley_version: String,
    ) -> Self {
        Self {
            run_id,
            scenario_name,
            started_at,
            run_duration,
            stages,
            peak_runners: 0,
            runners_started: 0,
            env: HashMap::with_capacity(0),
            volley_version,
            aggregate: AggregateSummary::default(),
        }
    }

    /// Set the runner counts reported by the scheduler
    pub fn set_runner_counts(&mut self, peak_runners: usize, runners_started: usize) {
        self.peak_runners = peak_runners;
        self.runners_started = runners_started;
    }

    pub fn set_aggregate(&mut self, aggregate: AggregateSummary) {
        self.aggregate = aggregate;
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the scenario.
    /// It uses the
    ///     - Scenario name
    ///     - Run duration
    ///     - Stages
    ///     - Selected environment variables
    ///     - Volley version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        if let Some(run_duration) = self.run_duration {
            Digest::update(&mut hasher, run_duration.to_le_bytes());
        }
        for stage in &self.stages {
            Digest::update(&mut hasher, stage.duration.as_millis().to_le_bytes());
            Digest::update(&mut hasher, stage.target.to_le_bytes());
        }
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.volley_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: PathBuf) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}
