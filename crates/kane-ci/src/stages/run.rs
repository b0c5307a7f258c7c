//! Stage 3: create a test run and populate it.
//!
//! The run is created empty, then replaced in a single update carrying every
//! instance. The two calls are not atomic: if the update fails the empty run
//! stays on the provider.

use std::fmt::Display;

use chrono::{DateTime, Local, TimeZone};

use crate::client::{ApiClient, Environment, RemoteId, TestCase, TestRunBody, TestRunInstance};
use crate::error::{Error, Result};
use crate::extract::{first_match, RUN_ID_RULES};

/// Objective attached to every generated run.
pub const RUN_OBJECTIVE: &str = "Triggered via Kane AI CI Orchestrator";

/// Tags attached to every generated run.
pub const RUN_TAGS: [&str; 2] = ["CI", "KaneAI"];

/// Builds the run title for `now`, e.g. `API GEN CI Run - 2026-10-17_14-05-09`.
///
/// Date and time both come from `now`, which the caller passes in local time.
/// Older tooling took the date in UTC and the time in local time, so titles
/// generated near midnight can differ by a day from those it produced.
#[must_use]
pub fn run_title<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("API GEN CI Run - {}", now.format("%Y-%m-%d_%H-%M-%S"))
}

/// Builds one instance per environment, numbered from 1 in list order.
#[must_use]
pub fn build_instances(case: &TestCase, environments: &[Environment]) -> Vec<TestRunInstance> {
    environments
        .iter()
        .zip(1u32..)
        .map(|(environment, serial_no)| TestRunInstance {
            test_case_id: case.test_case_id.clone(),
            environment_id: environment.id.clone(),
            name: case.title.clone(),
            serial_no,
            assignee: case.created_by.clone(),
        })
        .collect()
}

/// Creates the run shell and populates it; returns the run id.
///
/// # Errors
///
/// Returns [`Error::AmbiguousResponse`] if the create response carries no run
/// id, or a transport error if either call is rejected.
pub async fn create_and_populate(
    client: &ApiClient,
    project_id: u64,
    case: TestCase,
    environments: Vec<Environment>,
) -> Result<RemoteId> {
    let mut body = TestRunBody {
        id: None,
        project_id: project_id.to_string(),
        title: run_title(&Local::now()),
        objective: RUN_OBJECTIVE.to_string(),
        tags: RUN_TAGS.iter().map(|t| (*t).to_string()).collect(),
        is_auteur_generated: true,
        test_run_instances: Vec::new(),
    };

    tracing::info!(title = %body.title, "creating test run shell");
    let response = client.create_test_run(&body).await?;
    let run_id = first_match(RUN_ID_RULES, &response).ok_or_else(|| Error::AmbiguousResponse {
        message: "test run created but no run id found in response".to_string(),
        body: response.to_string(),
    })?;
    tracing::info!(run_id = %run_id, "created test run shell");

    tracing::info!(
        environments = environments.len(),
        "mapping environments to instances"
    );
    body.id = Some(run_id.clone());
    body.test_run_instances = build_instances(&case, &environments);

    client.update_test_run(&run_id, &body).await?;
    tracing::info!(
        run_id = %run_id,
        instances = body.test_run_instances.len(),
        "populated test run"
    );

    Ok(run_id)
}
