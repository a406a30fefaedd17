//! Domain model: environment report, deployment plan and error taxonomy.

pub mod error;
pub mod language;
pub mod plan;
pub mod report;

pub use error::{AutodeployError, Result};
pub use language::{default_start_command, RuntimeFamily, FALLBACK_START_COMMAND};
pub use plan::{
    CloudProvider, DeploymentPlan, EnvLine, ProvisioningVars, SizeTier, Strategy,
};
pub use report::{
    Dependency, EnvVar, EnvironmentReport, DEFAULT_LANGUAGE, DEFAULT_PORT, PREFERRED_PORTS,
};
