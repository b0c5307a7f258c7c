//! HTTP client for the LambdaTest Test Manager and HyperExecute APIs.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::Config;

/// Number of test cases fetched per lookup. Only the first page is searched.
pub const TEST_CASE_PAGE_SIZE: u32 = 40;

/// Number of environment configurations fetched per lookup.
pub const ENVIRONMENT_PAGE_SIZE: u32 = 50;

/// API client shared by every stage.
///
/// Both base URLs are called with the same Basic credentials.
pub struct ApiClient {
    client: Client,
    api_url: String,
    hyperexecute_url: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_url", &self.api_url)
            .field("hyperexecute_url", &self.hyperexecute_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Creates a new API client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, basic_auth(&config.username, &config.access_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| Error::Request {
                context: "failed to create HTTP client".to_string(),
                source,
            })?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            hyperexecute_url: config.hyperexecute_url.clone(),
        })
    }

    /// Lists the first page of test cases in a project.
    ///
    /// Entries are returned undecoded so one malformed record cannot hide the
    /// rest of the page.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn list_test_cases(&self, project_id: u64) -> Result<Vec<Value>> {
        let url = format!(
            "{}/projects/{project_id}/test-cases?per_page={TEST_CASE_PAGE_SIZE}",
            self.api_url
        );
        let page: ListEnvelope =
            read_json(send("GET", &url, self.client.get(&url)).await?).await?;
        Ok(page.data.unwrap_or_default())
    }

    /// Lists the first page of environment configurations, undecoded.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn list_environments(&self) -> Result<Vec<Value>> {
        let url = format!(
            "{}/environments?per_page={ENVIRONMENT_PAGE_SIZE}",
            self.api_url
        );
        let page: ListEnvelope =
            read_json(send("GET", &url, self.client.get(&url)).await?).await?;
        Ok(page.data.unwrap_or_default())
    }

    /// Creates a test run and returns the raw response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is not JSON.
    pub async fn create_test_run(&self, body: &TestRunBody) -> Result<Value> {
        let url = format!("{}/test-run", self.api_url);
        read_json(send("POST", &url, self.client.post(&url).json(body)).await?).await
    }

    /// Replaces the contents of an existing test run.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the provider rejects the update.
    pub async fn update_test_run(&self, run_id: &RemoteId, body: &TestRunBody) -> Result<()> {
        let url = format!("{}/test-run/{run_id}", self.api_url);
        send("PUT", &url, self.client.put(&url).json(body)).await?;
        Ok(())
    }

    /// Triggers a HyperExecute job and returns the raw response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is not JSON.
    pub async fn trigger_hyperexecute(&self, request: &HyperExecuteRequest) -> Result<Value> {
        let url = self.hyperexecute_url.clone();
        read_json(send("POST", &url, self.client.post(&url).json(request)).await?).await
    }
}

fn basic_auth(username: &str, access_key: &str) -> Result<HeaderValue> {
    let token = STANDARD.encode(format!("{username}:{access_key}"));
    let mut value =
        HeaderValue::from_str(&format!("Basic {token}")).map_err(|e| Error::Configuration {
            message: format!("credentials do not form a valid header: {e}"),
        })?;
    value.set_sensitive(true);
    Ok(value)
}

async fn send(method: &'static str, url: &str, request: RequestBuilder) -> Result<Response> {
    tracing::debug!(method, url, "sending request");
    let response = request.send().await.map_err(|source| Error::Request {
        context: format!("{method} {url}"),
        source,
    })?;

    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(Error::Transport {
            method,
            url: url.to_string(),
            status,
            body,
        })
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let url = response.url().to_string();
    response.json().await.map_err(|source| Error::Request {
        context: format!("failed to parse response from {url}"),
        source,
    })
}

// ============================================================================
// Shared Types
// ============================================================================

/// Provider-assigned identifier.
///
/// The provider returns ids as JSON numbers on some endpoints and strings on
/// others; the received JSON shape is kept when the id is sent back. Any JSON
/// number is accepted, including negative and fractional ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    /// Numeric id.
    Number(serde_json::Number),
    /// String id.
    Text(String),
}

impl RemoteId {
    /// Reads an id from a JSON value. `null`, empty strings and non-scalar
    /// values yield `None`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) if !s.is_empty() => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RemoteId {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for RemoteId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// `{ "data": [...] }` list wrapper.
#[derive(Debug, Deserialize)]
struct ListEnvelope {
    #[serde(default)]
    data: Option<Vec<Value>>,
}

// ============================================================================
// Test Cases
// ============================================================================

/// Test case as listed by the provider.
///
/// Only the entry whose title matched is decoded into this type; the other
/// entries of a page stay raw JSON. Fields other than the id and title are
/// passed through as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Test case id.
    pub test_case_id: RemoteId,
    /// Owning folder id.
    #[serde(default)]
    pub folder_id: Option<Value>,
    /// Title, unique within a project.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<Value>,
    /// Creator; becomes the assignee of every instance.
    #[serde(default)]
    pub created_by: Option<Value>,
}

// ============================================================================
// Environments
// ============================================================================

/// Named environment configuration, decoded from the matched page entry.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    /// Configuration id.
    pub id: RemoteId,
    /// Display name used for lookups.
    pub name: String,
    /// Concrete variants; only the first one is used.
    #[serde(default)]
    pub environments: Option<Vec<EnvironmentVariant>>,
}

/// One OS/browser combination inside a configuration.
///
/// Values are kept as received; versions show up as both strings and numbers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvironmentVariant {
    /// OS display name.
    #[serde(default)]
    pub os_name: Option<Value>,
    /// OS family.
    #[serde(default)]
    pub os: Option<Value>,
    /// OS version.
    #[serde(default)]
    pub os_version: Option<Value>,
    /// Browser name.
    #[serde(default)]
    pub browser: Option<Value>,
    /// Browser version.
    #[serde(default)]
    pub browser_version: Option<Value>,
    /// Platform classifier, e.g. `desktop` or `mobile`.
    #[serde(default)]
    pub platform: Option<Value>,
}

/// Environment projected for use in a test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    /// Configuration id.
    pub id: RemoteId,
    /// Configuration name.
    pub name: String,
    /// OS display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_name: Option<Value>,
    /// OS family.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<Value>,
    /// OS version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<Value>,
    /// Browser name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<Value>,
    /// Browser version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_version: Option<Value>,
    /// Platform classifier.
    pub platform: Value,
    /// Always `true`.
    pub is_complete: bool,
    /// Copied from the test case creator.
    pub assignee: Option<Value>,
}

// ============================================================================
// Test Runs
// ============================================================================

/// Body of both the create and the update test run requests.
#[derive(Debug, Clone, Serialize)]
pub struct TestRunBody {
    /// Run id; only set on update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RemoteId>,
    /// Project id, as a string.
    pub project_id: String,
    /// Run title.
    pub title: String,
    /// Run objective.
    pub objective: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Marks the run as API generated.
    pub is_auteur_generated: bool,
    /// Scheduled instances; empty on create.
    pub test_run_instances: Vec<TestRunInstance>,
}

/// One (test case, environment) pairing inside a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRunInstance {
    /// Test case id.
    pub test_case_id: RemoteId,
    /// Environment configuration id.
    pub environment_id: RemoteId,
    /// Display name, copied from the test case title.
    pub name: String,
    /// 1-based execution position.
    pub serial_no: u32,
    /// Assignee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Value>,
}

// ============================================================================
// HyperExecute
// ============================================================================

/// Request to execute a populated test run.
#[derive(Debug, Clone, Serialize)]
pub struct HyperExecuteRequest {
    /// Run to execute.
    pub test_run_id: RemoteId,
    /// Parallel sessions.
    pub concurrency: u32,
    /// Job title.
    pub title: String,
    /// Retry failed tests.
    pub retry_on_failure: bool,
    /// Retries per failed test.
    pub max_retries: u32,
}
