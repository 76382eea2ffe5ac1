mod checks_table;
mod operations_table;

use tabled::settings::Style;
use tabled::Table;
use volley_summary_model::AggregateSummary;

use crate::report::summary_report::checks_table::CheckRow;
use crate::report::summary_report::operations_table::OperationRow;
use crate::report::ReportCollector;
use crate::{CheckResult, OperationRecord};

/// Prints tables of check outcomes and operation timings to stderr at the end of the run.
///
/// Everything it needs is already in the aggregate, so nothing is kept per result.
#[derive(Debug, Default)]
pub struct SummaryReportCollector;

impl SummaryReportCollector {
    pub fn new() -> Self {
        Self
    }

    fn print_summary(summary: &AggregateSummary) {
        eprintln!(
            "\nSummary of checks ({} iterations, {} failed)",
            summary.total_iterations, summary.failed_iterations
        );
        let mut table = Table::new(summary.checks.iter().map(CheckRow::from));
        table.with(Style::modern());
        eprintln!("{table}");

        eprintln!("\nSummary of operations");
        let mut table = Table::new(summary.operations.iter().map(OperationRow::from));
        table.with(Style::modern());
        eprintln!("{table}");
    }
}

impl ReportCollector for SummaryReportCollector {
    fn add_check(&mut self, _result: &CheckResult) {}

    fn add_operation(&mut self, _operation_record: &OperationRecord) {}

    fn finalize(&mut self, summary: &AggregateSummary) {
        Self::print_summary(summary);
    }
}
