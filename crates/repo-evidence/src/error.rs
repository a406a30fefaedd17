//! Error types for repo-evidence

use thiserror::Error;

/// Errors that can occur while locating or fetching repository evidence
#[derive(Error, Debug)]
pub enum EvidenceError {
    /// Repository URL could not be parsed
    #[error("Invalid repository URL: {0}")]
    InvalidRepoUrl(String),

    /// Repository does not exist or is private
    #[error("Repository not found or private: {0}")]
    RepoNotFound(String),

    /// File not present at the requested ref
    #[error("File not found: {path}")]
    NotFound { path: String },

    /// Remote answered with an unexpected status
    #[error("Unexpected HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for EvidenceError {
    fn from(err: reqwest::Error) -> Self {
        EvidenceError::Http(err.to_string())
    }
}

impl EvidenceError {
    /// Whether this error means the file simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EvidenceError::NotFound { .. })
    }
}
