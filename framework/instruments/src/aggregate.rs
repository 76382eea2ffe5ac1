use hdrhistogram::Histogram;
use std::collections::HashMap;
use std::time::Duration;
use volley_summary_model::{AggregateSummary, CheckSummary, LatencySummary, OperationSummary};

use crate::{CheckResult, OperationRecord};

/// Latencies above this are clamped when recorded into the histogram. The exact maximum is still
/// tracked separately.
const MAX_TRACKED_LATENCY_MICROS: u64 = 60 * 60 * 1_000_000;
const SIGNIFICANT_FIGURES: u8 = 3;

/// Running totals for everything reported during a run.
///
/// Not synchronised itself, the [crate::Reporter] holds it behind a lock.
#[derive(Debug, Default)]
pub(crate) struct Aggregate {
    total_iterations: u64,
    failed_iterations: u64,
    checks: Vec<CheckCounts>,
    check_index: HashMap<String, usize>,
    operations: Vec<LatencyStats>,
    operation_index: HashMap<String, usize>,
}

#[derive(Debug)]
struct CheckCounts {
    name: String,
    passes: u64,
    fails: u64,
}

impl Aggregate {
    /// Make sure the check shows up in summaries even if it is never evaluated.
    pub(crate) fn register_check(&mut self, name: &str) {
        self.check_counts(name);
    }

    fn check_counts(&mut self, name: &str) -> &mut CheckCounts {
        let index = match self.check_index.get(name) {
            Some(index) => *index,
            None => {
                self.checks.push(CheckCounts {
                    name: name.to_string(),
                    passes: 0,
                    fails: 0,
                });
                self.check_index
                    .insert(name.to_string(), self.checks.len() - 1);
                self.checks.len() - 1
            }
        };

        &mut self.checks[index]
    }

    pub(crate) fn add_check(&mut self, result: &CheckResult) {
        let counts = self.check_counts(&result.check_name);
        if result.passed {
            counts.passes += 1;
        } else {
            counts.fails += 1;
        }
    }

    pub(crate) fn add_operation(&mut self, record: &OperationRecord) {
        let index = match self.operation_index.get(&record.operation_id) {
            Some(index) => *index,
            None => {
                self.operations
                    .push(LatencyStats::new(record.operation_id.clone()));
                self.operation_index
                    .insert(record.operation_id.clone(), self.operations.len() - 1);
                self.operations.len() - 1
            }
        };

        self.operations[index].record(record.duration(), record.is_error);
    }

    pub(crate) fn add_iteration(&mut self, record: &OperationRecord) {
        self.total_iterations += 1;
        if record.is_error {
            self.failed_iterations += 1;
        }
        self.add_operation(record);
    }

    pub(crate) fn summarize(&self) -> AggregateSummary {
        AggregateSummary {
            total_iterations: self.total_iterations,
            failed_iterations: self.failed_iterations,
            checks: self
                .checks
                .iter()
                .map(|c| CheckSummary::new(c.name.clone(), c.passes, c.fails))
                .collect(),
            operations: self.operations.iter().map(LatencyStats::summarize).collect(),
        }
    }
}

#[derive(Debug)]
struct LatencyStats {
    operation_id: String,
    count: u64,
    errors: u64,
    min: Duration,
    max: Duration,
    total: Duration,
    histogram: Option<Histogram<u64>>,
}

impl LatencyStats {
    fn new(operation_id: String) -> Self {
        Self {
            operation_id,
            count: 0,
            errors: 0,
            min: Duration::MAX,
            max: Duration::ZERO,
            total: Duration::ZERO,
            histogram: new_histogram(),
        }
    }

    fn record(&mut self, elapsed: Duration, is_error: bool) {
        self.count += 1;
        if is_error {
            self.errors += 1;
        }
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
        self.total += elapsed;

        if let Some(histogram) = &mut self.histogram {
            let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
            histogram.saturating_record(micros.max(1));
        }
    }

    fn summarize(&self) -> OperationSummary {
        let latency = if self.count == 0 {
            LatencySummary::default()
        } else {
            let quantile_ms = |q: f64| {
                self.histogram
                    .as_ref()
                    .map(|h| h.value_at_quantile(q) as f64 / 1000.0)
                    .unwrap_or_default()
            };
            LatencySummary {
                count: self.count,
                min_ms: as_ms(self.min),
                max_ms: as_ms(self.max),
                mean_ms: as_ms(self.total) / self.count as f64,
                p50_ms: quantile_ms(0.5),
                p90_ms: quantile_ms(0.9),
                p95_ms: quantile_ms(0.95),
                p99_ms: quantile_ms(0.99),
            }
        };

        OperationSummary {
            operation_id: self.operation_id.clone(),
            count: self.count,
            errors: self.errors,
            latency,
        }
    }
}

fn new_histogram() -> Option<Histogram<u64>> {
    match Histogram::new_with_bounds(1, MAX_TRACKED_LATENCY_MICROS, SIGNIFICANT_FIGURES) {
        Ok(histogram) => Some(histogram),
        Err(e) => {
            log::error!("Failed to create latency histogram, percentiles will be zero: {e}");
            None
        }
    }
}

fn as_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn finished(operation_id: &str, elapsed: Duration, is_error: bool) -> OperationRecord {
        let mut record = OperationRecord::new(operation_id);
        record.elapsed = Some(elapsed);
        record.is_error = is_error;
        record
    }

    #[test]
    fn registered_checks_keep_order_and_zero_counts() {
        let mut aggregate = Aggregate::default();
        aggregate.register_check("first");
        aggregate.register_check("second");
        aggregate.add_check(&CheckResult::new("second", true));
        aggregate.add_check(&CheckResult::new("third", false));

        let summary = aggregate.summarize();
        let names = summary
            .checks
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(vec!["first", "second", "third"], names);

        let first = summary.check("first").unwrap();
        assert_eq!((0, 0), (first.passes, first.fails));
        assert_eq!(0.0, first.pass_rate);
        assert_eq!(1.0, summary.check("second").unwrap().pass_rate);
        assert_eq!(1, summary.check("third").unwrap().fails);
    }

    #[test]
    fn latency_distribution() {
        let mut aggregate = Aggregate::default();
        for ms in [10, 20, 30, 40] {
            aggregate.add_operation(&finished("http_get", Duration::from_millis(ms), ms == 40));
        }

        let summary = aggregate.summarize();
        let op = summary.operation("http_get").unwrap();
        assert_eq!(4, op.count);
        assert_eq!(1, op.errors);
        assert!((op.latency.min_ms - 10.0).abs() < 1e-9);
        assert!((op.latency.max_ms - 40.0).abs() < 1e-9);
        assert!((op.latency.mean_ms - 25.0).abs() < 1e-9);
        // Three significant figures, so within 0.1% of the true value.
        assert!((op.latency.p50_ms - 20.0).abs() < 0.05);
        assert!((op.latency.p99_ms - 40.0).abs() < 0.05);
    }

    #[test]
    fn iterations_are_counted_and_timed() {
        let mut aggregate = Aggregate::default();
        aggregate.add_iteration(&finished(
            crate::ITERATION_OPERATION_ID,
            Duration::from_millis(3),
            false,
        ));
        aggregate.add_iteration(&finished(
            crate::ITERATION_OPERATION_ID,
            Duration::from_millis(4),
            true,
        ));

        let summary = aggregate.summarize();
        assert_eq!(2, summary.total_iterations);
        assert_eq!(1, summary.failed_iterations);
        assert_eq!(
            2,
            summary
                .operation(crate::ITERATION_OPERATION_ID)
                .unwrap()
                .count
        );
    }
}
