//! Autodeploy Core Library
//!
//! Infers how to run an unknown repository and synthesizes the artifacts that
//! bring it up: evidence is normalized into an [`EnvironmentReport`], planned
//! into a [`DeploymentPlan`], turned into a fallback [`BootstrapMachine`] and
//! rendered for a [`TargetDescriptor`].

pub mod bootstrap;
pub mod bundle;
pub mod config;
pub mod domain;
pub mod normalize;
pub mod oracle;
pub mod pipeline;
pub mod planner;
pub mod render;
pub mod telemetry;

pub use bootstrap::{
    synthesize_script, BootstrapMachine, BootstrapState, BootstrapStep, BootstrapTrace,
    HostConditions, ScriptedHost, StepOutcome,
};
pub use bundle::{
    read_report_json, render_bundle_summary_md, write_bundle, write_plan_json,
    write_report_json, BundleManifest,
};
pub use config::{AutodeployConfig, OracleConfig, OracleProvider, ProvisionConfig};
pub use domain::{
    AutodeployError, CloudProvider, Dependency, DeploymentPlan, EnvLine, EnvVar,
    EnvironmentReport, ProvisioningVars, Result, RuntimeFamily, SizeTier, Strategy,
};
pub use normalize::{ConfigNormalizer, JudgmentSource, Normalized};
pub use oracle::{
    oracle_from_config, DisabledOracle, HttpOracle, JudgmentOracle, PromptContext,
    PromptPurpose, StubOracle, StubReply,
};
pub use pipeline::{Analysis, AutodeployPipeline, Deployment, SynthesizedBootstrap};
pub use planner::{app_identity, DeploymentPlanBuilder, PlanOverrides};
pub use render::{Artifact, ArtifactBundle, ArtifactRenderer, TargetDescriptor};
pub use telemetry::init_tracing;

pub use repo_evidence;

/// Crate version, recorded in bundle manifests and CLI output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
