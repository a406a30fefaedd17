//! Provisioning stage definitions and configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Builtin provisioning stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinStage {
    /// terraform init -input=false
    TerraformInit,

    /// terraform plan -input=false
    TerraformPlan,

    /// terraform apply -auto-approve -input=false
    TerraformApply,

    /// terraform output -json
    TerraformOutput,

    /// terraform destroy -auto-approve -input=false
    TerraformDestroy,

    /// docker build -t <tag> .
    DockerBuild,
}

impl BuiltinStage {
    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinStage::TerraformInit => "terraform_init",
            BuiltinStage::TerraformPlan => "terraform_plan",
            BuiltinStage::TerraformApply => "terraform_apply",
            BuiltinStage::TerraformOutput => "terraform_output",
            BuiltinStage::TerraformDestroy => "terraform_destroy",
            BuiltinStage::DockerBuild => "docker_build",
        }
    }

    /// Get the stage's command. `tag` names the image for `docker build`
    /// and is ignored by the Terraform stages.
    pub fn command(&self, tag: &str) -> Vec<String> {
        let argv: &[&str] = match self {
            BuiltinStage::TerraformInit => &["terraform", "init", "-input=false"],
            BuiltinStage::TerraformPlan => &["terraform", "plan", "-input=false"],
            BuiltinStage::TerraformApply => {
                &["terraform", "apply", "-auto-approve", "-input=false"]
            }
            BuiltinStage::TerraformOutput => &["terraform", "output", "-json"],
            BuiltinStage::TerraformDestroy => {
                &["terraform", "destroy", "-auto-approve", "-input=false"]
            }
            BuiltinStage::DockerBuild => {
                return vec![
                    "docker".to_string(),
                    "build".to_string(),
                    "-t".to_string(),
                    tag.to_string(),
                    ".".to_string(),
                ];
            }
        };
        argv.iter().map(|s| s.to_string()).collect()
    }

    /// Default timeout for the stage.
    pub fn default_timeout_secs(&self) -> u64 {
        match self {
            BuiltinStage::TerraformInit | BuiltinStage::TerraformPlan => 300,
            BuiltinStage::TerraformOutput => 60,
            BuiltinStage::TerraformApply
            | BuiltinStage::TerraformDestroy
            | BuiltinStage::DockerBuild => 1800,
        }
    }

    /// Whether the stage changes real infrastructure.
    pub fn mutates(&self) -> bool {
        matches!(
            self,
            BuiltinStage::TerraformApply | BuiltinStage::TerraformDestroy
        )
    }
}

/// Configuration for a provisioning stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Human-readable stage name.
    pub name: String,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Timeout in seconds; 0 waits indefinitely.
    pub timeout_secs: u64,

    /// Whether this stage is enabled.
    pub enabled: bool,

    /// Directory the command runs in.
    pub working_dir: Option<PathBuf>,

    /// Whether the bundle gate must pass before this stage runs.
    pub gated: bool,
}

impl StageConfig {
    /// Create a stage configuration from a builtin stage.
    pub fn from_builtin(stage: BuiltinStage, tag: &str) -> Self {
        Self {
            name: stage.name().to_string(),
            command: stage.command(tag),
            timeout_secs: stage.default_timeout_secs(),
            enabled: true,
            working_dir: None,
            gated: stage.mutates(),
        }
    }

    /// Create a custom stage configuration.
    pub fn custom(name: String, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name,
            command,
            timeout_secs,
            enabled: true,
            working_dir: None,
            gated: false,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    /// Require the bundle gate before this stage.
    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    /// Disable this stage.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// `init`, `plan`, `apply`, `output` for `bundle_dir`.
pub fn apply_stages(bundle_dir: &Path) -> Vec<StageConfig> {
    [
        BuiltinStage::TerraformInit,
        BuiltinStage::TerraformPlan,
        BuiltinStage::TerraformApply,
        BuiltinStage::TerraformOutput,
    ]
    .iter()
    .map(|s| StageConfig::from_builtin(*s, "").in_dir(bundle_dir))
    .collect()
}

/// `init`, `plan` only; nothing is created.
pub fn plan_stages(bundle_dir: &Path) -> Vec<StageConfig> {
    [BuiltinStage::TerraformInit, BuiltinStage::TerraformPlan]
        .iter()
        .map(|s| StageConfig::from_builtin(*s, "").in_dir(bundle_dir))
        .collect()
}

pub fn destroy_stages(bundle_dir: &Path) -> Vec<StageConfig> {
    [BuiltinStage::TerraformInit, BuiltinStage::TerraformDestroy]
        .iter()
        .map(|s| StageConfig::from_builtin(*s, "").in_dir(bundle_dir))
        .collect()
}

/// `docker build` of `context_dir` using the bundle's Dockerfile.
pub fn docker_build_stage(dockerfile: &Path, context_dir: &Path, tag: &str) -> StageConfig {
    let mut stage = StageConfig::from_builtin(BuiltinStage::DockerBuild, tag).in_dir(context_dir);
    let context = stage.command.len() - 1;
    stage.command.insert(context, dockerfile.display().to_string());
    stage.command.insert(context, "-f".to_string());
    stage
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_stage_names() {
        assert_eq!(BuiltinStage::TerraformInit.name(), "terraform_init");
        assert_eq!(BuiltinStage::TerraformApply.name(), "terraform_apply");
        assert_eq!(BuiltinStage::TerraformOutput.name(), "terraform_output");
        assert_eq!(BuiltinStage::DockerBuild.name(), "docker_build");
    }

    #[test]
    fn test_builtin_stage_commands() {
        let apply = BuiltinStage::TerraformApply.command("");
        assert_eq!(apply[0], "terraform");
        assert!(apply.contains(&"-auto-approve".to_string()));

        let output = BuiltinStage::TerraformOutput.command("");
        assert_eq!(output, ["terraform", "output", "-json"]);

        let build = BuiltinStage::DockerBuild.command("autodeploy-demo:local");
        assert_eq!(build, ["docker", "build", "-t", "autodeploy-demo:local", "."]);
    }

    #[test]
    fn test_mutating_stages_are_gated() {
        assert!(StageConfig::from_builtin(BuiltinStage::TerraformApply, "").gated);
        assert!(StageConfig::from_builtin(BuiltinStage::TerraformDestroy, "").gated);
        assert!(!StageConfig::from_builtin(BuiltinStage::TerraformPlan, "").gated);
    }

    #[test]
    fn test_stage_sets_run_in_bundle() {
        let dir = Path::new("/tmp/bundle");
        let stages = apply_stages(dir);
        let names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["terraform_init", "terraform_plan", "terraform_apply", "terraform_output"]
        );
        assert!(stages.iter().all(|s| s.working_dir.as_deref() == Some(dir)));
        assert_eq!(destroy_stages(dir).len(), 2);
        assert_eq!(plan_stages(dir)[1].name, "terraform_plan");
    }

    #[test]
    fn test_docker_build_uses_bundle_dockerfile() {
        let stage = docker_build_stage(
            Path::new("/tmp/bundle/Dockerfile"),
            Path::new("/src/app"),
            "demo:local",
        );
        assert_eq!(
            stage.command,
            ["docker", "build", "-t", "demo:local", "-f", "/tmp/bundle/Dockerfile", "."]
        );
        assert_eq!(stage.working_dir.as_deref(), Some(Path::new("/src/app")));
        assert!(!stage.gated);
    }

    #[test]
    fn test_stage_config_custom_and_disabled() {
        let config = StageConfig::custom(
            "my_stage".to_string(),
            vec!["echo".to_string(), "hello".to_string()],
            60,
        );
        assert_eq!(config.timeout_secs, 60);
        assert!(config.enabled);
        assert!(!config.gated);
        assert!(!config.disabled().enabled);
    }
}
