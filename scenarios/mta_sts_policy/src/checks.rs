use volley_instruments::{Check, CheckSet};

pub const STATUS_CHECK: &str = "status was 200";
pub const VERSION_CHECK: &str = "response body contains valid MTA-STS policy version";
pub const MODE_CHECK: &str = "response body contains valid MTA-STS policy mode";
pub const MAX_AGE_CHECK: &str = "response body contains valid MTA-STS policy max_age";
pub const MX_CHECK: &str = "response body contains valid MTA-STS policy mx";

/// The checks run against every policy response. `mx` is captured when the set is built.
pub fn mta_sts_checks(mx: &str) -> CheckSet {
    CheckSet::new()
        .with(Check::status_equals(STATUS_CHECK, 200))
        .with(Check::body_contains(VERSION_CHECK, "version: STSv1"))
        .with(Check::body_contains(MODE_CHECK, "mode: testing"))
        .with(Check::body_contains(MAX_AGE_CHECK, "max_age: 86400"))
        .with(Check::body_contains(MX_CHECK, format!("mx: {mx}")))
}
