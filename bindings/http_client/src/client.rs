use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use url::Url;
use volley_instruments::{report_operation, CheckResult, CheckSet, OperationRecord, Reporter, Response};

use crate::error::NetworkError;

/// Operation id recorded for every GET request.
pub const HTTP_GET_OPERATION_ID: &str = "http_get";

/// A `reqwest` client that reports the timing of every request, and optionally the results of a
/// [CheckSet], to a [Reporter].
///
/// Cheap to clone. Clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpClientInstrumented {
    client: reqwest::Client,
    reporter: Arc<Reporter>,
}

impl HttpClientInstrumented {
    /// Create a client whose requests fail with [NetworkError::Timeout] if they take longer than
    /// `timeout`, including reading the body.
    pub fn new(timeout: Duration, reporter: Arc<Reporter>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, reporter })
    }

    /// Send a GET request and read the whole body.
    ///
    /// The request is recorded as an [HTTP_GET_OPERATION_ID] operation, which is an error only if
    /// no response was received.
    pub async fn get(&self, url: &Url) -> Result<Response, NetworkError> {
        let record = OperationRecord::new(HTTP_GET_OPERATION_ID);
        let result = self.send_get(url).await;
        report_operation(&self.reporter, record, &result);

        result
    }

    /// Send a GET request and evaluate `checks` against the response.
    ///
    /// On a response, a passing `request succeeded` result is reported followed by one result per
    /// check. Without a response a failing `request succeeded` result is reported and every check
    /// is counted as failed, so that pass rates are never inflated by requests that failed early.
    pub async fn get_checked(&self, url: &Url, checks: &CheckSet) -> Result<Response, NetworkError> {
        match self.get(url).await {
            Ok(response) => {
                self.reporter.add_check(CheckResult::request_succeeded());
                self.reporter.add_checks(checks.evaluate(&response));
                Ok(response)
            }
            Err(e) => {
                log::debug!("GET {url} failed: {e}");
                self.reporter.add_check(CheckResult::request_failed(&e));
                self.reporter.add_checks(checks.skipped(&e));
                Err(e)
            }
        }
    }

    async fn send_get(&self, url: &Url) -> Result<Response, NetworkError> {
        let started = Instant::now();
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(Response::new(status, body, started.elapsed()))
    }
}
