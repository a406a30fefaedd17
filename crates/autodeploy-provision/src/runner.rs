//! Stage runner: executes a single provisioning stage as a child process.

use std::process::Stdio;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

use crate::stage::StageConfig;

/// Characters of stderr kept when a failing stage is summarised.
pub const STDERR_TAIL_CHARS: usize = 2000;

/// Result of executing a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub stage_name: String,

    /// Process exit code (-1 when the process never produced one).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Execution duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the stage passed (exit code 0).
    pub success: bool,
}

impl StageResult {
    /// Check if stage passed.
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Failed result for a stage that could not be run at all.
    pub fn not_run(stage_name: &str, reason: String) -> Self {
        Self {
            stage_name: stage_name.to_string(),
            exit_code: -1,
            stdout: String::new(),
            stderr: reason,
            duration_ms: 0,
            success: false,
        }
    }

    /// Last part of stderr, for one-line failure reports.
    pub fn stderr_tail(&self) -> &str {
        let trimmed = self.stderr.trim_end();
        let mut start = trimmed.len().saturating_sub(STDERR_TAIL_CHARS);
        while !trimmed.is_char_boundary(start) {
            start += 1;
        }
        &trimmed[start..]
    }
}

/// Stage runner.
pub struct StageRunner;

impl StageRunner {
    /// Execute a single stage.
    pub async fn execute_stage(config: &StageConfig) -> anyhow::Result<StageResult> {
        let start = Instant::now();

        let Some((program, args)) = config.command.split_first() else {
            return Err(anyhow::anyhow!("Stage {} has an empty command", config.name));
        };

        info!(
            stage = %config.name,
            command = %config.command.join(" "),
            "Executing provisioning stage"
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to spawn stage {}: {}", config.name, e))?;

        let output = if config.timeout_secs > 0 {
            let timeout = tokio::time::Duration::from_secs(config.timeout_secs);
            match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(stage = %config.name, timeout_secs = config.timeout_secs, "Stage timed out");
                    return Err(anyhow::anyhow!(
                        "Stage {} timed out after {}s",
                        config.name,
                        config.timeout_secs
                    ));
                }
            }
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let success = output.status.success();

        let result = StageResult {
            stage_name: config.name.clone(),
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            success,
        };

        info!(
            stage = %config.name,
            exit_code = exit_code,
            duration_ms = duration_ms,
            success = success,
            "Stage completed"
        );

        Ok(result)
    }
}
