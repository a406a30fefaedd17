//! Artifact rendering
//!
//! One renderer turns a [`DeploymentPlan`] plus the bootstrap script into the
//! text artifacts of a deployment target. Targets are a small tagged set
//! rather than per-provider copies of the same templates. Every substituted
//! plan value passes through [`escape`] for the syntax of the file it lands
//! in.

pub mod dockerfile;
pub mod envfile;
pub mod escape;
pub mod systemd;
pub mod terraform;

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bootstrap::{env_file_path, SCRIPT_ARTIFACT};
use crate::config::ProvisionConfig;
use crate::domain::{
    AutodeployError, CloudProvider, DeploymentPlan, Result, RuntimeFamily, Strategy,
};

pub use dockerfile::{render_dockerfile, DOCKERFILE_ARTIFACT, DOCKERIGNORE_ARTIFACT};
pub use envfile::{render_env_file, EnvFileReader, ENV_FILE_ARTIFACT};
pub use systemd::{render_unit, unit_name, ServiceUnit};
pub use terraform::{render_terraform, ProviderVars, TerraformFiles};

/// Where the application is meant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetDescriptor {
    /// A container image built from the repository.
    Container,
    /// A cloud VM provisioned from an infrastructure template.
    VmImage { provider: CloudProvider },
    /// A supervised service on an existing host.
    NativeService,
}

impl TargetDescriptor {
    pub fn name(self) -> String {
        match self {
            TargetDescriptor::Container => "container".to_string(),
            TargetDescriptor::VmImage { provider } => format!("vm-{}", provider.name()),
            TargetDescriptor::NativeService => "native".to_string(),
        }
    }

    /// Strategies the bootstrap script may use on this target.
    pub fn strategies(self) -> &'static [Strategy] {
        match self {
            TargetDescriptor::Container => &[Strategy::PulledImage, Strategy::LocalImage],
            TargetDescriptor::VmImage { .. } => {
                &[Strategy::PulledImage, Strategy::LocalImage, Strategy::Native]
            }
            TargetDescriptor::NativeService => &[Strategy::Native],
        }
    }
}

impl std::fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for TargetDescriptor {
    type Err = AutodeployError;

    /// `container`, `native`, `vm` (GCP), `vm-gcp` or `vm-aws`.
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "container" | "docker" => Ok(TargetDescriptor::Container),
            "native" | "service" => Ok(TargetDescriptor::NativeService),
            "vm" => Ok(TargetDescriptor::VmImage {
                provider: CloudProvider::default(),
            }),
            other => match other.strip_prefix("vm-") {
                Some(provider) => Ok(TargetDescriptor::VmImage {
                    provider: provider.parse()?,
                }),
                None => Err(AutodeployError::Config(format!(
                    "unknown target {:?} (expected container, vm, vm-gcp, vm-aws or native)",
                    s
                ))),
            },
        }
    }
}

/// One rendered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub name: String,
    #[serde(skip)]
    pub content: String,
    pub executable: bool,
}

impl Artifact {
    fn text(name: impl Into<String>, content: String) -> Self {
        Artifact {
            name: name.into(),
            content,
            executable: false,
        }
    }

    fn script(name: impl Into<String>, content: String) -> Self {
        Artifact {
            name: name.into(),
            content,
            executable: true,
        }
    }
}

/// All artifacts for one target, in a fixed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBundle {
    pub target: TargetDescriptor,
    pub artifacts: Vec<Artifact>,
}

impl ArtifactBundle {
    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.artifacts.iter().map(|a| a.name.as_str()).collect()
    }
}

/// Pure `plan -> text` rendering for every target.
pub struct ArtifactRenderer<'a> {
    provision: &'a ProvisionConfig,
}

impl<'a> ArtifactRenderer<'a> {
    pub fn new(provision: &'a ProvisionConfig) -> Self {
        Self { provision }
    }

    /// Render the bundle for `target`. `bootstrap_script` is embedded as is;
    /// it was escaped when it was synthesized.
    pub fn render(
        &self,
        target: TargetDescriptor,
        plan: &DeploymentPlan,
        bootstrap_script: &str,
    ) -> Result<ArtifactBundle> {
        let mut artifacts = Vec::new();
        match target {
            TargetDescriptor::Container => {
                artifacts.push(Artifact::text(DOCKERFILE_ARTIFACT, render_dockerfile(plan)?));
                artifacts.push(Artifact::text(
                    DOCKERIGNORE_ARTIFACT,
                    dockerfile::render_dockerignore(),
                ));
            }
            TargetDescriptor::VmImage { provider } => {
                if provider != plan.cloud {
                    return Err(AutodeployError::InvalidPlan(format!(
                        "plan was sized for {} but the target is {}",
                        plan.cloud, provider
                    )));
                }
                let provision = ProvisionConfig {
                    cloud: provider,
                    ..self.provision.clone()
                };
                for (name, content) in render_terraform(&provision, plan)?.files {
                    artifacts.push(Artifact::text(name, content));
                }
                artifacts.push(Artifact::script(SCRIPT_ARTIFACT, bootstrap_script.to_string()));
            }
            TargetDescriptor::NativeService => {
                artifacts.push(Artifact::text(unit_name(&plan.app_name), self.native_unit(plan)?));
                artifacts.push(Artifact::script(SCRIPT_ARTIFACT, bootstrap_script.to_string()));
            }
        }
        let reader = match target {
            TargetDescriptor::Container => EnvFileReader::Docker,
            TargetDescriptor::VmImage { .. } => EnvFileReader::for_plan(plan),
            TargetDescriptor::NativeService => EnvFileReader::Systemd,
        };
        artifacts.push(Artifact::text(ENV_FILE_ARTIFACT, render_env_file(plan, reader)?));

        for artifact in &artifacts {
            debug!(artifact = %artifact.name, bytes = artifact.content.len(), "artifact rendered");
        }
        info!(deploy_target = %target, artifacts = artifacts.len(), "bundle rendered");
        Ok(ArtifactBundle { target, artifacts })
    }

    fn native_unit(&self, plan: &DeploymentPlan) -> Result<String> {
        let app_dir = self.provision.app_dir.trim_end_matches('/');
        let venv_bin = format!("{}/.venv/bin", app_dir);
        let env_file = env_file_path(&plan.app_name);
        render_unit(&ServiceUnit {
            app_name: &plan.app_name,
            working_dir: app_dir,
            env_file: &env_file,
            command: &plan.start_command,
            path_prefix: (plan.runtime() == Some(RuntimeFamily::Python))
                .then_some(venv_bin.as_str()),
        })
    }
}
