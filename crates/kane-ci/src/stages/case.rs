//! Stage 1: resolve the target test case by title.

use serde_json::Value;

use crate::client::{ApiClient, TestCase};
use crate::error::{Error, Result};

/// Fetches the first page of test cases and returns the one titled `title`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if no case on the first page has exactly this
/// title, or a transport error if the listing fails.
pub async fn resolve_test_case(
    client: &ApiClient,
    project_id: u64,
    title: &str,
) -> Result<TestCase> {
    tracing::info!(project_id, "fetching test cases");
    let cases = client.list_test_cases(project_id).await?;
    tracing::debug!(count = cases.len(), "test cases listed");

    let case = find_by_title(&cases, title)?;
    tracing::info!(
        title = %case.title,
        test_case_id = %case.test_case_id,
        "found test case"
    );
    Ok(case)
}

/// Returns the first case whose title equals `title` exactly.
///
/// Entries are compared on their raw `title` string; only the matching entry
/// is decoded, so malformed siblings on the page are ignored.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if there is no such case, or
/// [`Error::AmbiguousResponse`] if the matching entry has no usable id.
pub fn find_by_title(cases: &[Value], title: &str) -> Result<TestCase> {
    let entry = cases
        .iter()
        .find(|case| case.get("title").and_then(Value::as_str) == Some(title))
        .ok_or_else(|| Error::NotFound {
            kind: "test case",
            name: title.to_string(),
        })?;

    serde_json::from_value(entry.clone()).map_err(|e| Error::AmbiguousResponse {
        message: format!("test case \"{title}\" has no usable test_case_id: {e}"),
        body: entry.to_string(),
    })
}
