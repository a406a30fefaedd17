//! Error taxonomy for the inference, planning and rendering stages.

/// Autodeploy pipeline errors.
///
/// Only [`AutodeployError::AllStrategiesExhausted`] and
/// [`AutodeployError::RenderEscape`] are fatal to a run; the pipeline
/// recovers locally from every other variant.
#[derive(Debug, thiserror::Error)]
pub enum AutodeployError {
    /// The judgment text held no usable JSON object.
    #[error("judgment parse error: {0}")]
    JudgmentParse(String),

    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("oracle timed out after {seconds}s")]
    OracleTimeout { seconds: u64 },

    #[error("{stage}: all strategies exhausted (attempted: {})", attempted.join(" -> "))]
    AllStrategiesExhausted {
        stage: String,
        attempted: Vec<String>,
    },

    #[error("cannot render {field} into {artifact}: {reason}")]
    RenderEscape {
        artifact: String,
        field: String,
        reason: String,
    },

    #[error("invalid deployment plan: {0}")]
    InvalidPlan(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("evidence error: {0}")]
    Evidence(#[from] repo_evidence::EvidenceError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AutodeployError {
    pub(crate) fn render(artifact: &str, field: &str, reason: impl Into<String>) -> Self {
        AutodeployError::RenderEscape {
            artifact: artifact.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error must fail the run rather than be recovered from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AutodeployError::AllStrategiesExhausted { .. } | AutodeployError::RenderEscape { .. }
        )
    }
}

impl From<reqwest::Error> for AutodeployError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AutodeployError::Oracle(format!("request timed out: {}", err))
        } else {
            AutodeployError::Oracle(err.to_string())
        }
    }
}

impl From<toml::de::Error> for AutodeployError {
    fn from(err: toml::de::Error) -> Self {
        AutodeployError::Config(err.to_string())
    }
}

/// Result type for Autodeploy operations.
pub type Result<T> = std::result::Result<T, AutodeployError>;
