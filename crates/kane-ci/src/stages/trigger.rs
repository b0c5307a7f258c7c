//! Stage 4: trigger HyperExecute and persist the job id.

use std::path::Path;

use serde_json::Value;

use crate::client::{ApiClient, HyperExecuteRequest, RemoteId};
use crate::error::{Error, Result};
use crate::extract::{first_match, JOB_ID_RULES};

/// Parallel sessions requested for every job.
pub const CONCURRENCY: u32 = 2;

/// Retries per failed test.
pub const MAX_RETRIES: u32 = 1;

/// Key written to the job artifact.
pub const JOB_ID_KEY: &str = "KANE_JOB_ID";

/// Builds the execution request for `run_id`.
#[must_use]
pub fn trigger_request(run_id: RemoteId) -> HyperExecuteRequest {
    HyperExecuteRequest {
        title: format!("KaneAI Build - {run_id}"),
        test_run_id: run_id,
        concurrency: CONCURRENCY,
        retry_on_failure: true,
        max_retries: MAX_RETRIES,
    }
}

/// Reads the job id out of a trigger response.
///
/// # Errors
///
/// Returns [`Error::AmbiguousResponse`] if no known field carries it.
pub fn job_id_from(body: &Value) -> Result<RemoteId> {
    first_match(JOB_ID_RULES, body).ok_or_else(|| Error::AmbiguousResponse {
        message: "execution triggered, but no job id found in response".to_string(),
        body: body.to_string(),
    })
}

/// Triggers execution of `run_id` and returns the job id.
///
/// # Errors
///
/// Returns a transport error if the trigger is rejected, or
/// [`Error::AmbiguousResponse`] if it succeeds without a job id.
pub async fn trigger_execution(client: &ApiClient, run_id: RemoteId) -> Result<RemoteId> {
    tracing::info!(run_id = %run_id, "triggering Kane AI execution");
    let response = client.trigger_hyperexecute(&trigger_request(run_id)).await?;
    let job_id = job_id_from(&response)?;
    tracing::info!(job_id = %job_id, "Kane AI execution started");
    Ok(job_id)
}

/// Writes `KANE_JOB_ID=<job id>` to `path`, replacing any previous content.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be written.
pub async fn write_job_file(path: &Path, job_id: &RemoteId) -> Result<()> {
    tokio::fs::write(path, format!("{JOB_ID_KEY}={job_id}"))
        .await
        .map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
    tracing::info!(path = %path.display(), "saved job id");
    Ok(())
}
