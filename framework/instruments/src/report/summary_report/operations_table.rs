use tabled::Tabled;
use volley_summary_model::OperationSummary;

#[derive(Tabled)]
pub struct OperationRow {
    pub operation_id: String,
    pub count: u64,
    pub errors: u64,
    #[tabled(display = "float2")]
    pub avg_time_ms: f64,
    #[tabled(display = "float2")]
    pub min_time_ms: f64,
    #[tabled(display = "float2")]
    pub p50_time_ms: f64,
    #[tabled(display = "float2")]
    pub p95_time_ms: f64,
    #[tabled(display = "float2")]
    pub p99_time_ms: f64,
    #[tabled(display = "float2")]
    pub max_time_ms: f64,
}

impl From<&OperationSummary> for OperationRow {
    fn from(operation: &OperationSummary) -> Self {
        Self {
            operation_id: operation.operation_id.clone(),
            count: operation.count,
            errors: operation.errors,
            avg_time_ms: operation.latency.mean_ms,
            min_time_ms: operation.latency.min_ms,
            p50_time_ms: operation.latency.p50_ms,
            p95_time_ms: operation.latency.p95_ms,
            p99_time_ms: operation.latency.p99_ms,
            max_time_ms: operation.latency.max_ms,
        }
    }
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}
