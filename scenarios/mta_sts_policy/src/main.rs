mod checks;
mod config;

use anyhow::Context;
use http_client_instrumented::prelude::{HttpClient, Url};
use std::process::ExitCode;
use std::time::Duration;
use volley_instruments::{CheckSet, REQUEST_SUCCEEDED_CHECK};
use volley_runner::prelude::*;

use crate::checks::mta_sts_checks;
use crate::config::ScenarioConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything the virtual users share, set up once before any of them start.
#[derive(Debug)]
struct PolicyTarget {
    url: Url,
    checks: CheckSet,
    client: HttpClient,
}

#[derive(Debug, Default)]
struct MtaStsRunnerContext {
    target: Option<PolicyTarget>,
}

impl UserValuesConstraint for MtaStsRunnerContext {}

#[derive(Debug, Default)]
struct MtaStsVuContext;

impl UserValuesConstraint for MtaStsVuContext {}

fn setup(ctx: &mut RunnerContext<MtaStsRunnerContext>) -> HookResult {
    let config = ScenarioConfig::from_env()?;
    log::info!(
        "Requesting {} for domain [{}], expecting mx [{}]",
        config.policy_url(),
        config.domain(),
        config.mx()
    );

    let checks = mta_sts_checks(config.mx());
    ctx.reporter()
        .register_checks(std::iter::once(REQUEST_SUCCEEDED_CHECK).chain(checks.names()));

    let client = HttpClient::new(REQUEST_TIMEOUT, ctx.reporter().clone())?;

    ctx.get_mut().target = Some(PolicyTarget {
        url: config.policy_url().clone(),
        checks,
        client,
    });

    Ok(())
}

fn vu_behaviour(ctx: &mut VuContext<MtaStsRunnerContext, MtaStsVuContext>) -> HookResult {
    let runner_context = ctx.runner_context();
    let target = runner_context
        .get()
        .target
        .as_ref()
        .context("Policy target was not set up")?;

    runner_context.executor().execute_in_place(async {
        target.client.get_checked(&target.url, &target.checks).await?;
        Ok(())
    })
}

fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new(Duration::from_secs(30), 1000),
        Stage::new(Duration::from_secs(60), 100),
        Stage::new(Duration::from_secs(20), 50),
    ]
}

type Builder = ScenarioDefinitionBuilder<MtaStsRunnerContext, MtaStsVuContext>;

fn define(builder: Builder) -> Builder {
    builder
        .with_default_stages(default_stages())
        .with_default_iteration_pause(Duration::from_secs(1))
        .add_capture_env("BASE_URL")
        .add_capture_env("DOMAIN")
        .add_capture_env("MX")
        .use_setup(setup)
        .use_vu_behaviour(vu_behaviour)
}

fn main() -> VolleyResult<ExitCode> {
    let outcome = run(define(Builder::new_with_init(env!("CARGO_PKG_NAME"))))?;

    Ok(outcome.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{MAX_AGE_CHECK, MODE_CHECK, MX_CHECK, STATUS_CHECK, VERSION_CHECK};
    use http_client_instrumented::HTTP_GET_OPERATION_ID;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const POLICY: &str = "version: STSv1\nmode: testing\nmax_age: 86400\nmx: mail.example.com\n";

    fn short_run_cli() -> VolleyScenarioCli {
        VolleyScenarioCli {
            stages: vec![
                Stage::new(Duration::from_millis(100), 2),
                Stage::new(Duration::from_millis(300), 2),
            ],
            tick_ms: 20,
            iteration_pause_ms: Some(10),
            no_progress: true,
            reporter: ReporterOpt::Noop,
            report_interval_s: 0,
            ..Default::default()
        }
    }

    fn all_check_names() -> Vec<&'static str> {
        vec![
            REQUEST_SUCCEEDED_CHECK,
            STATUS_CHECK,
            VERSION_CHECK,
            MODE_CHECK,
            MAX_AGE_CHECK,
            MX_CHECK,
        ]
    }

    // Both runs share one test because the configuration is read from the process environment.
    #[test]
    fn policy_checks_against_served_and_unreachable_policy() {
        // The mock server needs its own runtime, the scenario blocks on the one it creates.
        let mock_runtime = tokio::runtime::Runtime::new().unwrap();
        let mock_server = mock_runtime.block_on(async {
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/.well-known/mta-sts.txt"))
                .respond_with(ResponseTemplate::new(200).set_body_string(POLICY))
                .mount(&mock_server)
                .await;
            mock_server
        });

        std::env::set_var("BASE_URL", mock_server.uri());
        std::env::set_var("DOMAIN", "example.com");
        std::env::set_var("MX", "mail.example.com");

        let outcome = run(define(Builder::new("served_policy", short_run_cli()))).unwrap();

        assert!(outcome.passed);
        assert_eq!(Some(&mock_server.uri()), outcome.summary.env.get("BASE_URL"));
        let aggregate = &outcome.summary.aggregate;
        assert_eq!(
            all_check_names(),
            aggregate
                .checks
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
        );
        for check in &aggregate.checks {
            assert!(check.passes > 0, "{}", check.name);
            assert_eq!(0, check.fails, "{}", check.name);
        }
        let requests = aggregate.operation(HTTP_GET_OPERATION_ID).unwrap();
        assert_eq!(0, requests.errors);
        assert_eq!(aggregate.total_iterations, requests.count);

        // Bind then drop a listener to find a port that nothing is listening on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        std::env::set_var("BASE_URL", format!("http://127.0.0.1:{port}"));

        let outcome = run(define(Builder::new("unreachable_policy", short_run_cli()))).unwrap();

        assert!(!outcome.passed);
        let aggregate = &outcome.summary.aggregate;
        assert!(aggregate.total_iterations > 0);
        assert_eq!(aggregate.total_iterations, aggregate.failed_iterations);
        for check in &aggregate.checks {
            assert_eq!(0, check.passes, "{}", check.name);
            assert_eq!(aggregate.total_iterations, check.fails, "{}", check.name);
        }
    }
}
