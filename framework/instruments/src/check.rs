use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::fmt::{Debug, Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

/// Name of the check that is recorded for every request, before the [CheckSet] is evaluated.
///
/// When the request fails, this is the only check that is evaluated. Every check in the [CheckSet]
/// is then recorded as failed with [CheckSet::skipped].
pub const REQUEST_SUCCEEDED_CHECK: &str = "request succeeded";

/// The parts of an HTTP response that checks can inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    body: String,
    latency: Duration,
}

impl Response {
    pub fn new(status: u16, body: String, latency: Duration) -> Self {
        Self {
            status,
            body,
            latency,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }
}

/// The outcome of evaluating one [Check] against one [Response].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub check_name: String,
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
    /// Set when the check could not be evaluated, for example because the predicate panicked or the
    /// request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    pub fn new(check_name: impl Into<String>, passed: bool) -> Self {
        Self {
            check_name: check_name.into(),
            passed,
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// A failing result for a check that could not be evaluated.
    pub fn errored(check_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(check_name, false)
        }
    }

    pub fn request_succeeded() -> Self {
        Self::new(REQUEST_SUCCEEDED_CHECK, true)
    }

    pub fn request_failed(error: &impl Display) -> Self {
        Self::errored(REQUEST_SUCCEEDED_CHECK, error.to_string())
    }
}

pub type CheckPredicate = Box<dyn Fn(&Response) -> anyhow::Result<bool> + Send + Sync>;

/// A named assertion about a [Response].
pub struct Check {
    name: String,
    predicate: CheckPredicate,
}

impl Check {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        Self::fallible(name, move |response| Ok(predicate(response)))
    }

    /// A check whose predicate can fail. An error is recorded as a failing result for this check.
    pub fn fallible<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Response) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }

    /// Passes when the response status equals `expected`.
    pub fn status_equals(name: impl Into<String>, expected: u16) -> Self {
        Self::new(name, move |response| response.status() == expected)
    }

    /// Passes when the response body contains `needle`. The needle is captured now, not looked up
    /// when the check runs.
    pub fn body_contains(name: impl Into<String>, needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self::new(name, move |response| response.body().contains(&needle))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate this check. Errors and panics from the predicate become a failing result.
    pub fn evaluate(&self, response: &Response) -> CheckResult {
        match catch_unwind(AssertUnwindSafe(|| (self.predicate)(response))) {
            Ok(Ok(passed)) => CheckResult::new(self.name.clone(), passed),
            Ok(Err(e)) => {
                log::debug!("Check [{}] could not be evaluated: {e:#}", self.name);
                CheckResult::errored(self.name.clone(), format!("{e:#}"))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::debug!("Check [{}] panicked: {message}", self.name);
                CheckResult::errored(self.name.clone(), format!("check panicked: {message}"))
            }
        }
    }
}

impl Debug for Check {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// An ordered set of checks that are all evaluated against every response.
#[derive(Debug, Default)]
pub struct CheckSet {
    checks: Vec<Check>,
}

impl CheckSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(Check::name)
    }

    /// Evaluate every check, in order. There is no short-circuit, a failing check does not stop
    /// the following checks from being evaluated.
    pub fn evaluate(&self, response: &Response) -> Vec<CheckResult> {
        self.checks
            .iter()
            .map(|check| check.evaluate(response))
            .collect()
    }

    /// A failing result for every check, for when there was no response to evaluate them against.
    pub fn skipped(&self, error: &impl Display) -> Vec<CheckResult> {
        let reason = format!("skipped, request failed: {error}");
        self.checks
            .iter()
            .map(|check| CheckResult::errored(check.name.clone(), reason.clone()))
            .collect()
    }
}
