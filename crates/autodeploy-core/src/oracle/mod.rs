//! Judgment oracle
//!
//! The oracle is an external chat-completions service treated as an
//! untrusted black box: it receives a prompt and returns text with no schema
//! guarantee. [`consult`] is the only place the pipeline awaits it, always
//! under a bounded timeout.

pub mod prompt;
pub mod stub;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{OracleConfig, OracleProvider};
use crate::domain::{AutodeployError, Result};

pub use prompt::{environment_report_prompt, path_selection_prompt, protect_braces};
pub use stub::{StubOracle, StubReply};

/// What a prompt asks the oracle to decide.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PromptPurpose {
    PathSelection,
    EnvironmentReport,
}

/// A fully rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub purpose: PromptPurpose,
    pub system: String,
    pub user: String,
}

/// Source of free-form judgments.
#[async_trait]
pub trait JudgmentOracle: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the oracle can be consulted at all.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn judge(&self, prompt: &PromptContext) -> Result<String>;
}

/// Await the oracle under `timeout`.
pub async fn consult(
    oracle: &dyn JudgmentOracle,
    prompt: &PromptContext,
    timeout: Duration,
) -> Result<String> {
    if !oracle.is_enabled() {
        return Err(AutodeployError::Oracle(format!(
            "{} oracle is disabled",
            oracle.name()
        )));
    }
    debug!(oracle = oracle.name(), purpose = ?prompt.purpose, "consulting oracle");
    match tokio::time::timeout(timeout, oracle.judge(prompt)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(oracle = oracle.name(), purpose = ?prompt.purpose, "oracle timed out");
            Err(AutodeployError::OracleTimeout {
                seconds: timeout.as_secs(),
            })
        }
    }
}

/// Placeholder used when no API key is configured; every judgment goes
/// through the heuristic fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledOracle;

#[async_trait]
impl JudgmentOracle for DisabledOracle {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn judge(&self, _prompt: &PromptContext) -> Result<String> {
        Err(AutodeployError::Oracle("no API key configured".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Chat-completions client for OpenRouter or OpenAI.
pub struct HttpOracle {
    config: OracleConfig,
    http_client: reqwest::Client,
}

impl HttpOracle {
    pub fn new(config: OracleConfig) -> Result<Self> {
        if !config.enabled() {
            return Err(AutodeployError::Config(format!(
                "{} is not set",
                config.provider.api_key_var()
            )));
        }
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("autodeploy/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl JudgmentOracle for HttpOracle {
    fn name(&self) -> &str {
        match self.config.provider {
            OracleProvider::OpenRouter => "openrouter",
            OracleProvider::OpenAi => "openai",
        }
    }

    async fn judge(&self, prompt: &PromptContext) -> Result<String> {
        let body = ChatRequest {
            model: self.config.model(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: 0.0,
        };

        let mut request = self
            .http_client
            .post(self.config.completions_url())
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .json(&body);
        if self.config.provider == OracleProvider::OpenRouter {
            request = request
                .header("HTTP-Referer", "http://localhost")
                .header("X-Title", "Autodeploy");
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AutodeployError::Oracle(format!(
                "{} returned {}: {}",
                self.name(),
                status,
                detail.chars().take(300).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AutodeployError::Oracle(format!("{} returned no content", self.name())))
    }
}

/// Oracle for a configuration: HTTP when an API key is set, disabled otherwise.
pub fn oracle_from_config(config: &OracleConfig) -> Result<Arc<dyn JudgmentOracle>> {
    if config.enabled() {
        Ok(Arc::new(HttpOracle::new(config.clone())?))
    } else {
        debug!(
            key = config.provider.api_key_var(),
            "no API key, oracle disabled"
        );
        Ok(Arc::new(DisabledOracle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> PromptContext {
        PromptContext {
            purpose: PromptPurpose::EnvironmentReport,
            system: "s".into(),
            user: "u".into(),
        }
    }

    #[tokio::test]
    async fn disabled_oracle_is_never_judged() {
        let err = consult(&DisabledOracle, &prompt(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_oracle_times_out() {
        let oracle = StubOracle::new().reply(PromptPurpose::EnvironmentReport, StubReply::Hang);
        let err = consult(&oracle, &prompt(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AutodeployError::OracleTimeout { seconds: 5 }));
        assert_eq!(oracle.call_count(), 1);
    }

    #[test]
    fn config_without_key_yields_disabled_oracle() {
        let oracle = oracle_from_config(&OracleConfig::default()).unwrap();
        assert!(!oracle.is_enabled());
        assert!(HttpOracle::new(OracleConfig::default()).is_err());
    }

    #[test]
    fn config_with_key_yields_http_oracle() {
        let config = OracleConfig::default().with_api_key("sk-test");
        let oracle = oracle_from_config(&config).unwrap();
        assert_eq!(oracle.name(), "openrouter");
        assert!(oracle.is_enabled());
    }
}
