//! Deployment plan derived from an environment report.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::AutodeployError;
use super::language::RuntimeFamily;

/// Cloud provider targeted by the infrastructure template.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    #[default]
    Gcp,
    Aws,
}

impl CloudProvider {
    pub fn name(self) -> &'static str {
        match self {
            CloudProvider::Gcp => "gcp",
            CloudProvider::Aws => "aws",
        }
    }

    /// Provider machine class for a sizing tier.
    pub fn machine_class(self, tier: SizeTier) -> &'static str {
        match (self, tier) {
            (CloudProvider::Gcp, SizeTier::Micro) => "e2-micro",
            (CloudProvider::Gcp, SizeTier::Small) => "e2-small",
            (CloudProvider::Gcp, SizeTier::Standard2) => "e2-standard-2",
            (CloudProvider::Gcp, SizeTier::Standard4) => "e2-standard-4",
            (CloudProvider::Aws, SizeTier::Micro) => "t3.micro",
            (CloudProvider::Aws, SizeTier::Small) => "t3.small",
            (CloudProvider::Aws, SizeTier::Standard2) => "t3.large",
            (CloudProvider::Aws, SizeTier::Standard4) => "t3.xlarge",
        }
    }
}

impl FromStr for CloudProvider {
    type Err = AutodeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcp" | "google" => Ok(CloudProvider::Gcp),
            "aws" | "amazon" => Ok(CloudProvider::Aws),
            other => Err(AutodeployError::Config(format!(
                "unsupported cloud provider: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Machine sizing tier chosen from the dependency profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum SizeTier {
    Micro,
    Small,
    Standard2,
    Standard4,
}

impl SizeTier {
    pub fn default_disk_gb(self) -> u32 {
        match self {
            SizeTier::Micro => 20,
            SizeTier::Small => 30,
            SizeTier::Standard2 => 50,
            SizeTier::Standard4 => 80,
        }
    }
}

/// One way of starting the application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    PulledImage,
    LocalImage,
    Native,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::PulledImage => "pulled-image",
            Strategy::LocalImage => "local-image",
            Strategy::Native => "native",
        }
    }

    /// Whether the strategy needs the application source on the host.
    pub fn needs_source(self) -> bool {
        !matches!(self, Strategy::PulledImage)
    }
}

/// A single `KEY=VALUE` environment line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvLine {
    pub key: String,
    pub value: String,
}

impl EnvLine {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for EnvLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Everything needed to render artifacts for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentPlan {
    /// Stable identity shared by containers, service units and cloud resources.
    pub app_name: String,
    pub repo_url: String,
    pub git_ref: Option<String>,
    pub language: String,
    pub language_version: Option<String>,
    pub app_port: u16,
    pub start_command: String,
    /// Ordered, unique by key.
    pub env_lines: Vec<EnvLine>,
    pub cloud: CloudProvider,
    pub size_tier: SizeTier,
    pub machine_class: String,
    pub disk_size_gb: u32,
    pub image_reference: Option<String>,
    pub strategy_order: Vec<Strategy>,
}

/// The flat parameter set handed to the infrastructure template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisioningVars {
    pub app_port: u16,
    pub machine_class: String,
    pub disk_size_gb: u32,
    pub image_reference: Option<String>,
}

impl DeploymentPlan {
    pub fn runtime(&self) -> Option<RuntimeFamily> {
        RuntimeFamily::from_language(&self.language)
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env_lines
            .iter()
            .find(|l| l.key == key)
            .map(|l| l.value.as_str())
    }

    pub fn uses(&self, strategy: Strategy) -> bool {
        self.strategy_order.contains(&strategy)
    }

    pub fn provisioning_vars(&self) -> ProvisioningVars {
        ProvisioningVars {
            app_port: self.app_port,
            machine_class: self.machine_class.clone(),
            disk_size_gb: self.disk_size_gb,
            image_reference: self.image_reference.clone(),
        }
    }

    /// Copy of the plan restricted to the given strategies, keeping order.
    pub fn restricted_to(&self, allowed: &[Strategy]) -> DeploymentPlan {
        let mut plan = self.clone();
        plan.strategy_order.retain(|s| allowed.contains(s));
        plan
    }
}
