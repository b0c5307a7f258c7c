//! Pipeline stages.
//!
//! Each stage consumes the previous stage's output; nothing is retried and
//! the first failure ends the run.

pub mod case;
pub mod environment;
pub mod run;
pub mod trigger;

use tracing::Instrument;

use crate::client::{ApiClient, RemoteId};
use crate::error::Result;
use crate::observability::stage_span;
use crate::Config;

/// Runs the full pipeline and returns the triggered job id.
///
/// The job artifact is written only after every stage has succeeded.
///
/// # Errors
///
/// Returns the first stage error unchanged.
pub async fn orchestrate(config: &Config) -> Result<RemoteId> {
    let client = ApiClient::new(config)?;
    let project_id = config.project_id;

    let case = case::resolve_test_case(&client, project_id, &config.target_title)
        .instrument(stage_span("case", project_id))
        .await?;

    let environments =
        environment::resolve_environments(&client, &config.target_env_names, &case)
            .instrument(stage_span("environment", project_id))
            .await?;

    let run_id = run::create_and_populate(&client, project_id, case, environments)
        .instrument(stage_span("run", project_id))
        .await?;

    let job_id = trigger::trigger_execution(&client, run_id)
        .instrument(stage_span("trigger", project_id))
        .await?;

    trigger::write_job_file(&config.job_file, &job_id).await?;

    Ok(job_id)
}
