use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use crate::Reporter;

/// Operation id used for the iteration timings recorded by the runner.
pub const ITERATION_OPERATION_ID: &str = "iteration";

/// A timed operation, such as one HTTP request or one whole iteration of a virtual user.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub operation_id: String,
    pub started_at: DateTime<Utc>,
    started: Instant,
    pub elapsed: Option<Duration>,
    pub is_error: bool,
}

impl OperationRecord {
    /// Start timing an operation now.
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            started_at: Utc::now(),
            started: Instant::now(),
            elapsed: None,
            is_error: false,
        }
    }

    /// Stop the timer. Only the first call has any effect.
    pub fn finish(&mut self, is_error: bool) {
        if self.elapsed.is_none() {
            self.elapsed = Some(self.started.elapsed());
            self.is_error = is_error;
        }
    }

    /// The recorded duration, or the time since the operation started if it hasn't finished.
    pub fn duration(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.started.elapsed())
    }
}

/// Finish `record` based on whether `response` is an error and add it to the reporter.
pub fn report_operation<T, E>(
    reporter: &Reporter,
    mut record: OperationRecord,
    response: &Result<T, E>,
) {
    record.finish(response.is_err());
    reporter.add_operation(&record);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_only_records_once() {
        let mut record = OperationRecord::new("op");
        record.finish(true);
        let first = record.elapsed;

        std::thread::sleep(Duration::from_millis(5));
        record.finish(false);

        assert_eq!(first, record.elapsed);
        assert!(record.is_error);
    }
}
