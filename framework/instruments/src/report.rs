mod results_file_report;
mod summary_report;

use parking_lot::Mutex;
use std::path::PathBuf;
use volley_summary_model::AggregateSummary;

use crate::aggregate::Aggregate;
use crate::{CheckResult, OperationRecord};

pub use results_file_report::ResultsFileReportCollector;
pub use summary_report::SummaryReportCollector;

/// A sink for results, in addition to the aggregate that the [Reporter] always keeps.
pub trait ReportCollector {
    fn add_check(&mut self, result: &CheckResult);

    fn add_operation(&mut self, operation_record: &OperationRecord);

    /// Called once, after every virtual user has stopped.
    fn finalize(&mut self, summary: &AggregateSummary);
}

/// Choose which collectors the [Reporter] forwards results to.
#[derive(Debug, Default)]
pub struct ReportConfig {
    enable_summary: bool,
    results_file: Option<PathBuf>,
}

impl ReportConfig {
    /// Print summary tables of checks and operations when the run finishes.
    pub fn enable_summary(mut self) -> Self {
        self.enable_summary = true;
        self
    }

    /// Write every check result and operation to `path` as JSON lines.
    pub fn enable_results_file(mut self, path: PathBuf) -> Self {
        self.results_file = Some(path);
        self
    }

    pub fn init(self, runtime: &tokio::runtime::Handle) -> anyhow::Result<Reporter> {
        let mut collectors: Vec<Box<dyn ReportCollector + Send>> = Vec::new();

        if self.enable_summary {
            collectors.push(Box::new(SummaryReportCollector::new()));
        }

        if let Some(path) = self.results_file {
            collectors.push(Box::new(ResultsFileReportCollector::new(runtime, path)?));
        }

        Ok(Reporter::new(collectors))
    }
}

/// The metrics aggregator that every virtual user reports to.
///
/// All methods take `&self` and are safe to call from any number of threads. The aggregate is
/// updated under a single lock, so [Reporter::summarize] never sees a partial update.
pub struct Reporter {
    aggregate: Mutex<Aggregate>,
    collectors: Vec<Mutex<Box<dyn ReportCollector + Send>>>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("collectors", &self.collectors.len())
            .finish_non_exhaustive()
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Reporter {
    pub fn new(collectors: Vec<Box<dyn ReportCollector + Send>>) -> Self {
        Self {
            aggregate: Mutex::new(Aggregate::default()),
            collectors: collectors.into_iter().map(Mutex::new).collect(),
        }
    }

    /// Pre-register checks so that they are reported, with a zero pass rate, even if they never
    /// get evaluated.
    pub fn register_checks<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        let mut aggregate = self.aggregate.lock();
        for name in names {
            aggregate.register_check(name);
        }
    }

    pub fn add_check(&self, result: CheckResult) {
        self.aggregate.lock().add_check(&result);
        for collector in &self.collectors {
            collector.lock().add_check(&result);
        }
    }

    pub fn add_checks(&self, results: impl IntoIterator<Item = CheckResult>) {
        for result in results {
            self.add_check(result);
        }
    }

    pub fn add_operation(&self, operation_record: &OperationRecord) {
        self.aggregate.lock().add_operation(operation_record);
        for collector in &self.collectors {
            collector.lock().add_operation(operation_record);
        }
    }

    /// Record one completed iteration. Failed iterations are those whose behaviour returned an
    /// error.
    pub fn add_iteration(&self, operation_record: &OperationRecord) {
        self.aggregate.lock().add_iteration(operation_record);
        for collector in &self.collectors {
            collector.lock().add_operation(operation_record);
        }
    }

    pub fn summarize(&self) -> AggregateSummary {
        self.aggregate.lock().summarize()
    }

    /// Produce the final summary and let every collector finish its output.
    pub fn finalize(&self) -> AggregateSummary {
        let summary = self.summarize();
        for collector in &self.collectors {
            collector.lock().finalize(&summary);
        }
        summary
    }
}
