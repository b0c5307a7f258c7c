//! Error types for the orchestrator.

use reqwest::StatusCode;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Orchestration error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The provider answered with a non-success status.
    #[error("{method} {url} failed ({status})")]
    Transport {
        /// Request method.
        method: &'static str,
        /// Request URL.
        url: String,
        /// Response status.
        status: StatusCode,
        /// Raw response body.
        body: String,
    },

    /// The request could not be sent or its response could not be read.
    #[error("{context}: {source}")]
    Request {
        /// What was being attempted.
        context: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// A named entity is missing from the first page of results.
    #[error("{kind} \"{name}\" not found")]
    NotFound {
        /// Entity kind, e.g. `test case`.
        kind: &'static str,
        /// The name that was searched for.
        name: String,
    },

    /// A resolution step matched nothing.
    #[error("{message}")]
    EmptyResult {
        /// Human readable message.
        message: String,
    },

    /// A successful response did not carry an expected identifier.
    #[error("{message}")]
    AmbiguousResponse {
        /// Human readable message.
        message: String,
        /// Raw response body.
        body: String,
    },

    /// Settings could not be turned into a usable client.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Human readable message.
        message: String,
    },

    /// Writing the job artifact failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Target path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns the provider response body attached to this error, if any.
    #[must_use]
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::Transport { body, .. } | Self::AmbiguousResponse { body, .. }
                if !body.is_empty() =>
            {
                Some(body.as_str())
            }
            _ => None,
        }
    }
}
