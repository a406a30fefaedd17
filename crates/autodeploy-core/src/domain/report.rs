//! Canonical environment report produced by normalization.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

/// Language recorded when nothing identifies one.
pub const DEFAULT_LANGUAGE: &str = "unknown";

/// Port used when no valid port survives normalization.
pub const DEFAULT_PORT: u16 = 8000;

/// Conventional web ports, highest preference first.
pub const PREFERRED_PORTS: &[u16] = &[80, 8080, 5000, 8000];

/// A declared dependency. `version` is passed through untouched and may be a
/// range expression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub version: Option<String>,
    pub source: String,
}

/// An environment variable referenced by the application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    pub required: bool,
    pub default: Option<String>,
    pub description: String,
}

/// Canonical record of how a repository runs.
///
/// Built once per run and only read afterwards. Every key is always present
/// when serialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentReport {
    pub language: String,
    #[serde(alias = "languageVersion")]
    pub language_version: Option<String>,
    pub frameworks: BTreeSet<String>,
    #[serde(alias = "packageManager")]
    pub package_manager: Option<String>,
    pub dependencies: Vec<Dependency>,
    #[serde(alias = "devDependencies")]
    pub dev_dependencies: Vec<Dependency>,
    #[serde(alias = "envVars")]
    pub env_vars: Vec<EnvVar>,
    #[serde(alias = "startCommands")]
    pub start_commands: Vec<String>,
    pub ports: Vec<u16>,
    pub notes: Vec<String>,
}

impl Default for EnvironmentReport {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            language_version: None,
            frameworks: BTreeSet::new(),
            package_manager: None,
            dependencies: Vec::new(),
            dev_dependencies: Vec::new(),
            env_vars: Vec::new(),
            start_commands: Vec::new(),
            ports: vec![DEFAULT_PORT],
            notes: Vec::new(),
        }
    }
}

impl EnvironmentReport {
    /// The port the application is expected to listen on.
    pub fn primary_port(&self) -> u16 {
        self.ports.first().copied().unwrap_or(DEFAULT_PORT)
    }

    /// All dependency names, runtime first, lower-cased.
    pub fn dependency_names(&self) -> impl Iterator<Item = String> + '_ {
        self.dependencies
            .iter()
            .chain(self.dev_dependencies.iter())
            .map(|d| d.name.to_lowercase())
    }

    pub fn env_var(&self, name: &str) -> Option<&EnvVar> {
        self.env_vars
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
    }

    /// Invariant violations; empty for every normalized report.
    pub fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.language.trim().is_empty() {
            out.push("language is empty".to_string());
        }
        if self.ports.is_empty() {
            out.push("ports is empty".to_string());
        }
        if self.ports.contains(&0) {
            out.push("ports contains 0".to_string());
        }
        let mut seen = HashSet::new();
        for var in &self.env_vars {
            if var.name.is_empty() {
                out.push("env var with empty name".to_string());
            } else if !seen.insert(var.name.to_ascii_lowercase()) {
                out.push(format!("duplicate env var {}", var.name));
            }
        }
        for dep in self.dependencies.iter().chain(self.dev_dependencies.iter()) {
            if dep.name.trim().is_empty() {
                out.push("dependency with empty name".to_string());
            }
        }
        if self.frameworks.iter().any(|f| f.trim().is_empty()) {
            out.push("framework with empty name".to_string());
        }
        out
    }
}
