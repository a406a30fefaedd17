//! Provisioning pipeline orchestration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::gate::{BundleGate, GateVerdict};
use crate::outputs::{derive_app_url, parse_terraform_outputs};
use crate::runner::{StageResult, StageRunner};
use crate::spec::ProvisionSpec;
use crate::stage::{BuiltinStage, StageConfig};

/// Run record written beside the bundle after each provisioning run.
pub const PROVISION_RECORD: &str = "provision.json";

/// Pseudo-stage name used when the bundle gate blocks a run.
pub const GATE_STAGE: &str = "bundle_gate";

/// Result of a complete provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionResult {
    pub run_id: String,

    /// Stable label derived from the stage list and bundle contents.
    pub run_label: String,

    pub started_at: DateTime<Utc>,

    /// Whether every enabled stage passed.
    pub success: bool,

    /// Results of the stages that ran, in order.
    pub stages: Vec<StageResult>,

    /// First stage that failed; nothing after it ran.
    pub failed_stage: Option<String>,

    /// Verdict of the bundle gate, when a gated stage was reached.
    pub gate: Option<GateVerdict>,

    /// Values from `terraform output -json`.
    pub outputs: BTreeMap<String, Value>,

    pub app_url: Option<String>,

    pub duration_ms: u64,
}

impl ProvisionResult {
    /// Number of stages that passed.
    pub fn passed_count(&self) -> usize {
        self.stages.iter().filter(|s| s.passed()).count()
    }

    /// Number of stages that failed.
    pub fn failed_count(&self) -> usize {
        self.stages.iter().filter(|s| !s.passed()).count()
    }

    /// One-line description of the failure, if any.
    pub fn failure_summary(&self) -> Option<String> {
        let name = self.failed_stage.as_ref()?;
        let stage = self.stages.iter().find(|s| &s.stage_name == name)?;
        let tail = stage.stderr_tail().lines().last().unwrap_or("").trim();
        Some(if tail.is_empty() {
            format!("{} failed (exit {})", name, stage.exit_code)
        } else {
            format!("{} failed (exit {}): {}", name, stage.exit_code, tail)
        })
    }

    /// Write the run record into `dir`.
    pub fn write_record(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let path = dir.join(PROVISION_RECORD);
        let json = serde_json::to_string_pretty(self).context("serialize provision record")?;
        std::fs::write(&path, json).with_context(|| format!("write {:?}", path))?;
        Ok(path)
    }
}

/// Provisioning pipeline orchestrator.
pub struct ProvisionPipeline;

impl ProvisionPipeline {
    /// Execute `stages` in order against the bundle described by `spec`.
    ///
    /// Disabled stages are skipped. Gated stages run only after the bundle
    /// gate passes. The first failure ends the run.
    pub async fn run(spec: &ProvisionSpec, stages: Vec<StageConfig>) -> anyhow::Result<ProvisionResult> {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        let run_label = spec.run_label();

        info!(run_id = %run_id, run_label = %run_label, bundle = %spec.bundle_dir.display(), "Starting provisioning run");

        let mut stage_results = Vec::new();
        let mut failed_stage = None;
        let mut gate = None;
        let mut outputs = BTreeMap::new();

        for config in stages {
            if !config.enabled {
                info!(stage = %config.name, "Skipping disabled stage");
                continue;
            }

            if config.gated && gate.is_none() {
                let verdict = BundleGate::evaluate(&spec.bundle_dir);
                let passed = verdict.passed;
                if !passed {
                    warn!(violations = ?verdict.violations, "{}", verdict.message);
                    stage_results.push(StageResult::not_run(
                        GATE_STAGE,
                        verdict.violations.join("\n"),
                    ));
                    failed_stage = Some(GATE_STAGE.to_string());
                }
                gate = Some(verdict);
                if !passed {
                    break;
                }
            }

            let result = match StageRunner::execute_stage(&config).await {
                Ok(r) => r,
                Err(e) => StageResult::not_run(&config.name, format!("{:#}", e)),
            };

            if !result.passed() {
                warn!(stage = %config.name, exit_code = result.exit_code, "Stage failed, stopping");
                failed_stage = Some(config.name.clone());
                stage_results.push(result);
                break;
            }

            if config.name == BuiltinStage::TerraformOutput.name() {
                match parse_terraform_outputs(&result.stdout) {
                    Ok(parsed) => outputs = parsed,
                    Err(e) => warn!(error = %e, "Unreadable terraform output"),
                }
            }
            stage_results.push(result);
        }

        let app_url = derive_app_url(&outputs, spec.app_port);
        let duration_ms = start.elapsed().as_millis() as u64;
        let success = failed_stage.is_none();

        info!(
            run_id = %run_id,
            success = success,
            app_url = app_url.as_deref().unwrap_or("-"),
            duration_ms = duration_ms,
            "Provisioning run finished"
        );

        Ok(ProvisionResult {
            run_id,
            run_label,
            started_at,
            success,
            stages: stage_results,
            failed_stage,
            gate,
            outputs,
            app_url,
            duration_ms,
        })
    }
}
