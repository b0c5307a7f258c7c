//! Stage 2: resolve the requested environment configurations.

use serde_json::Value;

use crate::client::{ApiClient, Environment, EnvironmentConfig, EnvironmentVariant, TestCase};
use crate::error::{Error, Result};

/// Platform used when a variant does not declare one.
pub const DEFAULT_PLATFORM: &str = "desktop";

/// Fetches environment configurations and projects the ones named in `names`.
///
/// # Errors
///
/// Returns [`Error::EmptyResult`] if none of the names resolve, or a transport
/// error if the listing fails.
pub async fn resolve_environments(
    client: &ApiClient,
    names: &[String],
    case: &TestCase,
) -> Result<Vec<Environment>> {
    tracing::info!(names = %names.join(", "), "fetching environments");
    let configs = client.list_environments().await?;
    tracing::debug!(count = configs.len(), "environment configurations listed");

    select_environments(&configs, names, case)
}

/// Resolves `names` against the raw `configs` page in the order given.
///
/// Names are compared against each entry's raw `name` string and only the
/// matching entry is decoded. Unknown names, and matches that have no usable
/// id or variant, are skipped with a warning. The result is dense and follows
/// `names`.
///
/// # Errors
///
/// Returns [`Error::EmptyResult`] if nothing resolved.
pub fn select_environments(
    configs: &[Value],
    names: &[String],
    case: &TestCase,
) -> Result<Vec<Environment>> {
    let mut resolved = Vec::with_capacity(names.len());

    for name in names {
        let Some(entry) = configs
            .iter()
            .find(|c| c.get("name").and_then(Value::as_str) == Some(name.as_str()))
        else {
            tracing::warn!(name = %name, "environment not found in API response, skipping");
            continue;
        };
        let config: EnvironmentConfig = match serde_json::from_value(entry.clone()) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(name = %name, error = %e, "environment entry unusable, skipping");
                continue;
            }
        };
        let Some(variant) = config.environments.as_deref().and_then(<[_]>::first) else {
            tracing::warn!(
                name = %name,
                id = %config.id,
                "environment has no variants, skipping"
            );
            continue;
        };

        let environment = project(&config, variant, case);
        tracing::info!(name = %name, id = %environment.id, "found environment");
        resolved.push(environment);
    }

    if resolved.is_empty() {
        return Err(Error::EmptyResult {
            message: "no matching environments found".to_string(),
        });
    }

    Ok(resolved)
}

fn project(config: &EnvironmentConfig, variant: &EnvironmentVariant, case: &TestCase) -> Environment {
    Environment {
        id: config.id.clone(),
        name: config.name.clone(),
        os_name: variant.os_name.clone(),
        os: variant.os.clone(),
        os_version: variant.os_version.clone(),
        browser: variant.browser.clone(),
        browser_version: variant.browser_version.clone(),
        platform: variant
            .platform
            .clone()
            .filter(is_set)
            .unwrap_or_else(|| Value::String(DEFAULT_PLATFORM.to_string())),
        is_complete: true,
        assignee: case.created_by.clone(),
    }
}

/// `false`, `0` and `""` count as unset, like a missing platform.
fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}
