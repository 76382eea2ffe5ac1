mod aggregate;
mod check;
mod operation;
mod report;

pub use check::{Check, CheckPredicate, CheckResult, CheckSet, Response, REQUEST_SUCCEEDED_CHECK};
pub use operation::{report_operation, OperationRecord, ITERATION_OPERATION_ID};
pub use report::{
    ReportCollector, ReportConfig, Reporter, ResultsFileReportCollector, SummaryReportCollector,
};

pub mod prelude {
    pub use crate::{
        report_operation, Check, CheckResult, CheckSet, OperationRecord, ReportCollector,
        ReportConfig, Reporter, Response, ITERATION_OPERATION_ID, REQUEST_SUCCEEDED_CHECK,
    };
}
