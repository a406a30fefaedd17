//! Autodeploy Provision - running rendered bundles
//!
//! Provides a provisioning pipeline that:
//! - Executes Terraform and Docker stages inside a bundle directory
//! - Gates `terraform apply` on bundle integrity
//! - Stops at the first failing stage and reports it
//! - Parses Terraform outputs into the application URL

pub mod gate;
pub mod outputs;
pub mod pipeline;
pub mod runner;
pub mod spec;
pub mod stage;

// Re-export key types
pub use gate::{BundleGate, GateVerdict};
pub use outputs::{derive_app_url, parse_terraform_outputs};
pub use pipeline::{ProvisionPipeline, ProvisionResult, GATE_STAGE, PROVISION_RECORD};
pub use runner::{StageResult, StageRunner};
pub use spec::ProvisionSpec;
pub use stage::{
    apply_stages, destroy_stages, docker_build_stage, plan_stages, BuiltinStage, StageConfig,
};
