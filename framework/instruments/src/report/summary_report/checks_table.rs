use tabled::Tabled;
use volley_summary_model::CheckSummary;

#[derive(Tabled)]
pub struct CheckRow {
    pub check: String,
    pub passes: u64,
    pub fails: u64,
    #[tabled(display = "percent")]
    pub pass_rate: f64,
}

impl From<&CheckSummary> for CheckRow {
    fn from(check: &CheckSummary) -> Self {
        Self {
            check: check.name.clone(),
            passes: check.passes,
            fails: check.fails,
            pass_rate: check.pass_rate,
        }
    }
}

fn percent(n: &f64) -> String {
    format!("{:.2}%", n * 100.0)
}
