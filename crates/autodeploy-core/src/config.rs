//! Run configuration
//!
//! One explicit [`AutodeployConfig`] value is built at startup (environment,
//! optional TOML file, then CLI overrides) and handed to every component.

use std::path::Path;
use std::time::Duration;

use repo_evidence::{CorpusBudget, GithubConfig};
use serde::{Deserialize, Serialize};

use crate::domain::{AutodeployError, CloudProvider, Result};

/// Default oracle timeout in seconds.
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 180;

/// Chat-completions provider behind the judgment oracle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    #[default]
    OpenRouter,
    OpenAi,
}

impl OracleProvider {
    pub fn base_url(self) -> &'static str {
        match self {
            OracleProvider::OpenRouter => "https://openrouter.ai/api/v1",
            OracleProvider::OpenAi => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            OracleProvider::OpenRouter => "openai/gpt-4o-mini",
            OracleProvider::OpenAi => "gpt-4o-mini",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            OracleProvider::OpenRouter => "OPENROUTER_API_KEY",
            OracleProvider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl std::str::FromStr for OracleProvider {
    type Err = AutodeployError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openrouter" => Ok(OracleProvider::OpenRouter),
            "openai" => Ok(OracleProvider::OpenAi),
            other => Err(AutodeployError::Config(format!(
                "provider must be 'openrouter' or 'openai', got {:?}",
                other
            ))),
        }
    }
}

/// Judgment oracle settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    pub provider: OracleProvider,
    /// Model name; provider default when unset
    pub model: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL override (mainly for tests and proxies)
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            provider: OracleProvider::default(),
            model: None,
            api_key: None,
            endpoint: None,
            timeout_secs: DEFAULT_ORACLE_TIMEOUT_SECS,
        }
    }
}

impl OracleConfig {
    pub fn enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn completions_url(&self) -> String {
        let base = self
            .endpoint
            .as_deref()
            .unwrap_or_else(|| self.provider.base_url());
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }
}

/// Where and how the application is provisioned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProvisionConfig {
    pub cloud: CloudProvider,
    pub project: Option<String>,
    pub region: String,
    pub zone: String,
    /// Base OS image for the VM; provider default when unset
    pub base_image: Option<String>,
    /// Checkout location on the host
    pub app_dir: String,
}

const DEFAULT_REGION: &str = "us-central1";
const DEFAULT_AWS_REGION: &str = "us-east-1";

impl ProvisionConfig {
    /// Region handed to the provider; the stock region is GCP-specific, so
    /// AWS falls back to its own default when the region was left unchanged.
    pub fn provider_region(&self) -> &str {
        match self.cloud {
            CloudProvider::Aws if self.region == DEFAULT_REGION => DEFAULT_AWS_REGION,
            _ => &self.region,
        }
    }

    /// Configured base image, or the provider's stock Linux image.
    pub fn provider_base_image(&self) -> &str {
        match (&self.base_image, self.cloud) {
            (Some(image), _) => image,
            (None, CloudProvider::Gcp) => "debian-cloud/debian-12",
            (None, CloudProvider::Aws) => "ubuntu/images/hvm-ssd/ubuntu-jammy-22.04-*-server-*",
        }
    }
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        ProvisionConfig {
            cloud: CloudProvider::Gcp,
            project: None,
            region: DEFAULT_REGION.to_string(),
            zone: "us-central1-a".to_string(),
            base_image: None,
            app_dir: "/opt/autodeploy/app".to_string(),
        }
    }
}

/// Complete configuration for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutodeployConfig {
    pub oracle: OracleConfig,
    pub github: GithubConfig,
    pub budget: CorpusBudget,
    pub provision: ProvisionConfig,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AutodeployConfig {
    /// Build from environment variables on top of defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = AutodeployConfig {
            github: GithubConfig::from_env(),
            ..Default::default()
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML file, then let environment variables fill what it leaves
    /// unset (API keys and tokens) or override provider selection.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AutodeployError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if config.github.token.is_none() {
            config.github.token = env_var("GITHUB_TOKEN");
        }
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(provider) = env_var("CHAT_PROVIDER") {
            self.oracle.provider = provider.parse()?;
        }
        if let Some(model) = env_var("CHAT_MODEL") {
            self.oracle.model = Some(model);
        }
        if self.oracle.api_key.is_none() {
            self.oracle.api_key = env_var(self.oracle.provider.api_key_var());
        }
        if let Some(cloud) = env_var("AUTODEPLOY_CLOUD") {
            self.provision.cloud = cloud.parse()?;
        }
        if let Some(project) = env_var("AUTODEPLOY_PROJECT") {
            self.provision.project = Some(project);
        }
        if let Some(region) = env_var("AUTODEPLOY_REGION") {
            self.provision.region = region;
        }
        if let Some(zone) = env_var("AUTODEPLOY_ZONE") {
            self.provision.zone = zone;
        }
        if let Some(dir) = env_var("AUTODEPLOY_APP_DIR") {
            self.provision.app_dir = dir;
        }
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.budget.max_files == 0 {
            return Err(AutodeployError::Config("budget.max_files must be > 0".into()));
        }
        if !self.provision.app_dir.starts_with('/') {
            return Err(AutodeployError::Config(format!(
                "provision.app_dir must be absolute, got {:?}",
                self.provision.app_dir
            )));
        }
        Ok(())
    }
}
