use serde::{Deserialize, Serialize};

/// Point in time summary of everything the virtual users have reported.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregateSummary {
    /// The number of iterations completed by all virtual users
    pub total_iterations: u64,
    /// The number of iterations whose behaviour returned an error, for example because the request
    /// could not be sent
    pub failed_iterations: u64,
    /// Pass and fail counts for each check, in the order the checks were first seen
    pub checks: Vec<CheckSummary>,
    /// Latency distributions for each timed operation, in the order they were first seen
    pub operations: Vec<OperationSummary>,
}

impl AggregateSummary {
    pub fn check(&self, name: &str) -> Option<&CheckSummary> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn operation(&self, operation_id: &str) -> Option<&OperationSummary> {
        self.operations
            .iter()
            .find(|o| o.operation_id == operation_id)
    }

    /// The checks whose pass rate is below `threshold`.
    ///
    /// A check that was never evaluated has a pass rate of zero, so it is included here unless the
    /// threshold is zero.
    pub fn checks_below_threshold(&self, threshold: f64) -> Vec<&CheckSummary> {
        self.checks
            .iter()
            .filter(|c| c.pass_rate < threshold)
            .collect()
    }

    /// True if every check has a pass rate of at least `threshold`.
    pub fn meets_threshold(&self, threshold: f64) -> bool {
        self.checks_below_threshold(threshold).is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
    /// `passes / (passes + fails)`, or 0 if the check was never evaluated
    pub pass_rate: f64,
}

impl CheckSummary {
    pub fn new(name: String, passes: u64, fails: u64) -> Self {
        let total = passes + fails;
        let pass_rate = if total == 0 {
            0.0
        } else {
            passes as f64 / total as f64
        };

        Self {
            name,
            passes,
            fails,
            pass_rate,
        }
    }

    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationSummary {
    pub operation_id: String,
    pub count: u64,
    pub errors: u64,
    pub latency: LatencySummary,
}

/// Latency distribution in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}
