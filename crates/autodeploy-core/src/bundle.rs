//! Bundle persistence.
//!
//! A bundle directory holds the rendered artifacts plus `env_report.json`,
//! `plan.json` and `manifest.json`. It is assembled in a private temporary
//! directory beside the destination and renamed into place only once every
//! file is written, so a failed run never leaves a partial bundle behind.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::domain::{DeploymentPlan, EnvironmentReport};
use crate::normalize::JudgmentSource;
use crate::render::ArtifactBundle;

pub const SCHEMA_VERSION: &str = "1";
pub const REPORT_FILE: &str = "env_report.json";
pub const PLAN_FILE: &str = "plan.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// One artifact listed in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub executable: bool,
    pub sha256: String,
}

/// Describes one bundle. Timestamps and run ids live only here, never in
/// the artifacts themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleManifest {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub run_id: Uuid,
    pub repo_url: String,
    pub app_name: String,
    pub target: String,
    pub judgment_source: JudgmentSource,
    pub corpus_digest: String,
    pub artifacts: Vec<ManifestEntry>,
}

impl BundleManifest {
    pub fn new(
        plan: &DeploymentPlan,
        bundle: &ArtifactBundle,
        judgment_source: JudgmentSource,
        corpus_digest: impl Into<String>,
    ) -> Self {
        BundleManifest {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            run_id: Uuid::new_v4(),
            repo_url: plan.repo_url.clone(),
            app_name: plan.app_name.clone(),
            target: bundle.target.name(),
            judgment_source,
            corpus_digest: corpus_digest.into(),
            artifacts: bundle
                .artifacts
                .iter()
                .map(|a| ManifestEntry {
                    name: a.name.clone(),
                    executable: a.executable,
                    sha256: hex::encode(Sha256::digest(a.content.as_bytes())),
                })
                .collect(),
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {:?}", path.file_name().unwrap_or_default()))?;
    std::fs::write(path, content + "\n").with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write `env_report.json` in pretty JSON format.
pub fn write_report_json(path: &Path, report: &EnvironmentReport) -> Result<()> {
    write_json(path, report)
}

pub fn read_report_json(path: &Path) -> Result<EnvironmentReport> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("parse report {:?}", path))
}

pub fn write_plan_json(path: &Path, plan: &DeploymentPlan) -> Result<()> {
    write_json(path, plan)
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("chmod {:?}", path))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// A destination may be replaced only when it is absent, empty, or an
/// earlier bundle.
fn check_destination(out_dir: &Path) -> Result<bool> {
    if !out_dir.exists() {
        return Ok(false);
    }
    if !out_dir.is_dir() {
        bail!("{:?} exists and is not a directory", out_dir);
    }
    let empty = std::fs::read_dir(out_dir)
        .with_context(|| format!("read {:?}", out_dir))?
        .next()
        .is_none();
    if !empty && !out_dir.join(MANIFEST_FILE).is_file() {
        bail!(
            "refusing to replace {:?}: it is not empty and holds no {}",
            out_dir,
            MANIFEST_FILE
        );
    }
    Ok(true)
}

/// Persist a bundle at `out_dir`, replacing an earlier bundle there.
pub fn write_bundle(
    out_dir: &Path,
    bundle: &ArtifactBundle,
    report: &EnvironmentReport,
    plan: &DeploymentPlan,
    manifest: &BundleManifest,
) -> Result<PathBuf> {
    let replace = check_destination(out_dir)?;
    let parent = match out_dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).with_context(|| format!("create {:?}", parent))?;

    // Removed on drop, including every early return below.
    let staging = tempfile::Builder::new()
        .prefix(".autodeploy-")
        .tempdir_in(&parent)
        .with_context(|| format!("create staging directory in {:?}", parent))?;

    for artifact in &bundle.artifacts {
        let path = staging.path().join(&artifact.name);
        std::fs::write(&path, &artifact.content).with_context(|| format!("write {:?}", path))?;
        if artifact.executable {
            mark_executable(&path)?;
        }
    }
    write_report_json(&staging.path().join(REPORT_FILE), report)?;
    write_plan_json(&staging.path().join(PLAN_FILE), plan)?;
    write_json(&staging.path().join(MANIFEST_FILE), manifest)?;

    if replace {
        std::fs::remove_dir_all(out_dir).with_context(|| format!("remove {:?}", out_dir))?;
    }
    std::fs::rename(staging.path(), out_dir)
        .with_context(|| format!("move bundle into {:?}", out_dir))?;

    info!(path = %out_dir.display(), artifacts = bundle.artifacts.len(), "bundle written");
    Ok(out_dir.to_path_buf())
}

/// Render a markdown summary of a written bundle.
pub fn render_bundle_summary_md(manifest: &BundleManifest, plan: &DeploymentPlan) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Bundle `{}`\n\n", manifest.app_name));
    out.push_str(&format!(
        "- repository: {}\n- target: {}\n- judgment: {:?}\n- port: {}\n- start command: `{}`\n- machine: {} ({} GB)\n- strategies: {}\n\n",
        manifest.repo_url,
        manifest.target,
        manifest.judgment_source,
        plan.app_port,
        plan.start_command,
        plan.machine_class,
        plan.disk_size_gb,
        plan.strategy_order
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(" -> "),
    ));
    out.push_str("## Artifacts\n");
    for entry in &manifest.artifacts {
        let mode = if entry.executable { " (executable)" } else { "" };
        out.push_str(&format!("- `{}`{}\n", entry.name, mode));
    }
    out
}
