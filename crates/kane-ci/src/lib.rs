//! # kane-ci
//!
//! CI orchestrator for LambdaTest Test Manager and Kane AI HyperExecute.
//!
//! A single invocation runs four stages in order:
//!
//! 1. resolve a test case by exact title,
//! 2. resolve the requested environment configurations,
//! 3. create a test run and populate it with one instance per environment,
//! 4. trigger a HyperExecute job for the run and save its id to `kane_job.env`.
//!
//! ## Configuration
//!
//! All settings come from environment variables (each also has a long flag):
//!
//! - `LT_USERNAME` - account identifier (required)
//! - `LT_ACCESS_KEY` - access key (required)
//! - `LT_PROJECT_ID` - numeric project id (required)
//! - `TARGET_TITLE` - exact test case title (required)
//! - `TARGET_ENV_NAMES` - comma-separated environment names (required)
//! - `LT_API_URL` - test manager API base URL
//! - `KANE_HYPEREXECUTE_URL` - execution trigger URL
//! - `KANE_JOB_FILE` - path of the job id artifact (default: `kane_job.env`)
//! - `LOG_FORMAT` - `pretty` or `json`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod extract;
pub mod observability;
pub mod stages;

use std::path::PathBuf;

use clap::Parser;

pub use error::{Error, Result};

/// Default test manager API base URL.
pub const DEFAULT_API_URL: &str = "https://test-manager-api.lambdatest.com/api/v1";

/// Default HyperExecute trigger URL.
pub const DEFAULT_HYPEREXECUTE_URL: &str =
    "https://test-manager-api.lambdatest.com/api/atm/v1/hyperexecute";

/// Default name of the job id artifact.
pub const DEFAULT_JOB_FILE: &str = "kane_job.env";

/// Kane CI orchestrator.
#[derive(Debug, Parser)]
#[command(name = "kane-ci")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// LambdaTest account identifier.
    #[arg(long, env = "LT_USERNAME")]
    pub username: String,

    /// LambdaTest access key.
    #[arg(long, env = "LT_ACCESS_KEY", hide_env_values = true)]
    pub access_key: String,

    /// Test manager project id.
    #[arg(long, env = "LT_PROJECT_ID")]
    pub project_id: u64,

    /// Exact title of the test case to run.
    #[arg(long, env = "TARGET_TITLE")]
    pub target_title: String,

    /// Environment configuration names, comma-separated.
    #[arg(long, env = "TARGET_ENV_NAMES", value_delimiter = ',', required = true)]
    pub target_env_names: Vec<String>,

    /// Test manager API base URL.
    #[arg(long, env = "LT_API_URL", default_value = DEFAULT_API_URL, hide = true)]
    pub api_url: String,

    /// HyperExecute trigger URL.
    #[arg(
        long,
        env = "KANE_HYPEREXECUTE_URL",
        default_value = DEFAULT_HYPEREXECUTE_URL,
        hide = true
    )]
    pub hyperexecute_url: String,

    /// Where to write the `KANE_JOB_ID` artifact.
    #[arg(long, env = "KANE_JOB_FILE", default_value = DEFAULT_JOB_FILE, hide = true)]
    pub job_file: PathBuf,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty", hide = true)]
    pub log_format: observability::LogFormat,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            username: self.username.clone(),
            access_key: self.access_key.clone(),
            project_id: self.project_id,
            target_title: self.target_title.clone(),
            // Entries are trimmed and blanks dropped, so "A, B" looks up "B"
            // rather than " B" as a raw split would.
            target_env_names: self
                .target_env_names
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
            api_url: self.api_url.trim_end_matches('/').to_string(),
            hyperexecute_url: self.hyperexecute_url.clone(),
            job_file: self.job_file.clone(),
            log_format: self.log_format,
        }
    }
}

/// Orchestrator configuration.
#[derive(Clone)]
pub struct Config {
    /// Account identifier.
    pub username: String,
    /// Access key.
    pub access_key: String,
    /// Project id.
    pub project_id: u64,
    /// Title of the test case to resolve.
    pub target_title: String,
    /// Environment names, in the order instances are created.
    pub target_env_names: Vec<String>,
    /// Test manager API base URL, without a trailing slash.
    pub api_url: String,
    /// HyperExecute trigger URL.
    pub hyperexecute_url: String,
    /// Job id artifact path.
    pub job_file: PathBuf,
    /// Log output format.
    pub log_format: observability::LogFormat,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("access_key", &"[REDACTED]")
            .field("project_id", &self.project_id)
            .field("target_title", &self.target_title)
            .field("target_env_names", &self.target_env_names)
            .field("api_url", &self.api_url)
            .field("hyperexecute_url", &self.hyperexecute_url)
            .field("job_file", &self.job_file)
            .field("log_format", &self.log_format)
            .finish()
    }
}
