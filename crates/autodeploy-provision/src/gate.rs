//! Bundle gate: refuses to create infrastructure from a damaged bundle.

use std::path::Path;

use autodeploy_core::bootstrap::SCRIPT_ARTIFACT;
use autodeploy_core::bundle::MANIFEST_FILE;
use autodeploy_core::render::terraform::{MAIN_TF, OUTPUTS_TF, TFVARS_JSON, VARIABLES_TF};
use autodeploy_core::{BundleManifest, ProvisioningVars};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Smallest boot disk any provider accepts for the base images we use.
pub const MIN_DISK_GB: u32 = 10;

const REQUIRED_FILES: &[&str] = &[
    MANIFEST_FILE,
    MAIN_TF,
    VARIABLES_TF,
    OUTPUTS_TF,
    TFVARS_JSON,
    SCRIPT_ARTIFACT,
];

/// Gate verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateVerdict {
    /// Whether the gate passed.
    pub passed: bool,

    /// Problems found, one per entry.
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Bundle integrity gate.
pub struct BundleGate;

impl BundleGate {
    /// Check a bundle directory before `terraform apply`.
    pub fn evaluate(bundle_dir: &Path) -> GateVerdict {
        let mut violations = Vec::new();

        for name in REQUIRED_FILES {
            if !bundle_dir.join(name).is_file() {
                violations.push(format!("missing {}", name));
            }
        }

        if let Some(manifest) = read_json::<BundleManifest>(bundle_dir, MANIFEST_FILE, &mut violations)
        {
            if !manifest.target.starts_with("vm-") {
                violations.push(format!(
                    "bundle target '{}' has no infrastructure template",
                    manifest.target
                ));
            }
            for entry in &manifest.artifacts {
                match std::fs::read(bundle_dir.join(&entry.name)) {
                    Ok(bytes) => {
                        if hex::encode(Sha256::digest(&bytes)) != entry.sha256 {
                            violations.push(format!("{} does not match its manifest digest", entry.name));
                        }
                    }
                    Err(_) => violations.push(format!("{} listed in manifest but unreadable", entry.name)),
                }
            }
        }

        if let Some(vars) = read_json::<ProvisioningVars>(bundle_dir, TFVARS_JSON, &mut violations) {
            if vars.app_port == 0 {
                violations.push("app_port must be between 1 and 65535".to_string());
            }
            if vars.machine_class.trim().is_empty() {
                violations.push("machine_class is empty".to_string());
            }
            if vars.disk_size_gb < MIN_DISK_GB {
                violations.push(format!(
                    "disk_size_gb {} is below the minimum of {}",
                    vars.disk_size_gb, MIN_DISK_GB
                ));
            }
        }

        if let Ok(script) = std::fs::read_to_string(bundle_dir.join(SCRIPT_ARTIFACT)) {
            if !script.starts_with("#!/bin/sh") {
                violations.push(format!("{} lacks a #!/bin/sh header", SCRIPT_ARTIFACT));
            }
        }

        let passed = violations.is_empty();
        let message = if passed {
            "Bundle gate passed".to_string()
        } else {
            format!("Bundle gate failed: {} violation(s)", violations.len())
        };

        GateVerdict {
            passed,
            violations,
            message,
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(
    dir: &Path,
    name: &str,
    violations: &mut Vec<String>,
) -> Option<T> {
    let text = std::fs::read_to_string(dir.join(name)).ok()?;
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            violations.push(format!("{} is not valid: {}", name, e));
            None
        }
    }
}
