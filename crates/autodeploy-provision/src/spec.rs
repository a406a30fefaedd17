//! Provisioning run identity.

use std::path::{Path, PathBuf};

use anyhow::Context;
use autodeploy_core::bundle::MANIFEST_FILE;
use autodeploy_core::render::terraform::TFVARS_JSON;
use autodeploy_core::{BundleManifest, ProvisioningVars};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::stage::StageConfig;

/// What one provisioning run operates on.
///
/// Ties the stage list to the bundle it runs against, so two runs of the
/// same stages over the same bundle carry the same digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionSpec {
    /// Bundle directory the stages run in.
    pub bundle_dir: PathBuf,

    /// Application identity from the bundle manifest.
    pub app_name: String,

    /// Port from the template variables, when the bundle has them.
    pub app_port: Option<u16>,

    /// SHA-256 digest of ordered stage commands (deterministic).
    pub stages_digest: String,

    /// SHA-256 digest of the manifest's artifact digests.
    pub bundle_digest: String,
}

impl ProvisionSpec {
    /// Read the bundle manifest at `bundle_dir` and describe a run of `stages`.
    pub fn new(bundle_dir: &Path, stages: &[StageConfig]) -> anyhow::Result<Self> {
        let manifest_path = bundle_dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("read {:?}", manifest_path))?;
        let manifest: BundleManifest =
            serde_json::from_str(&text).with_context(|| format!("parse {:?}", manifest_path))?;

        let app_port = std::fs::read_to_string(bundle_dir.join(TFVARS_JSON))
            .ok()
            .and_then(|t| serde_json::from_str::<ProvisioningVars>(&t).ok())
            .map(|v| v.app_port);

        let mut hasher = Sha256::new();
        for entry in &manifest.artifacts {
            hasher.update(entry.name.as_bytes());
            hasher.update(b"\0");
            hasher.update(entry.sha256.as_bytes());
            hasher.update(b"\0");
        }

        Ok(Self {
            bundle_dir: bundle_dir.to_path_buf(),
            app_name: manifest.app_name,
            app_port,
            stages_digest: compute_stages_digest(stages),
            bundle_digest: hex::encode(hasher.finalize()),
        })
    }

    /// Short label naming this run in logs.
    pub fn run_label(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.stages_digest.as_bytes());
        hasher.update(self.bundle_digest.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("provision-{}-{}", self.app_name, &digest[..12])
    }
}

/// Compute deterministic digest of ordered stage commands.
fn compute_stages_digest(stages: &[StageConfig]) -> String {
    let mut hasher = Sha256::new();
    for stage in stages.iter().filter(|s| s.enabled) {
        hasher.update(stage.name.as_bytes());
        hasher.update(b"\0");
        for arg in &stage.command {
            hasher.update(arg.as_bytes());
            hasher.update(b"\x1f");
        }
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}
