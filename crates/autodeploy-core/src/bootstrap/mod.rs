//! Bootstrap synthesis
//!
//! A [`BootstrapMachine`] orders the ways of starting the application from
//! most to least specific; [`synthesize_script`] renders it as an
//! idempotent POSIX script that records its progress on the host.

pub mod machine;
pub mod script;
pub mod state;

pub use machine::{
    BootstrapMachine, BootstrapTrace, HostConditions, ScriptedHost, StepOutcome, Transition,
};
pub use script::{synthesize_script, ScriptSynthesizer, SCRIPT_ARTIFACT};
pub use state::{
    Action, BootstrapState, BootstrapStep, CommandMode, ImageSource, Precondition, SuccessCheck,
};

use crate::render::systemd::unit_name;

/// Append-only bootstrap log location.
pub const LOG_DIR: &str = "/var/log/autodeploy";
pub const LOG_FILE: &str = "/var/log/autodeploy/bootstrap.log";

/// Last state reached by the script.
pub const STATE_DIR: &str = "/var/lib/autodeploy";
pub const STATE_FILE: &str = "/var/lib/autodeploy/state";

pub const ENV_DIR: &str = "/etc/autodeploy";

pub const ENV_HEREDOC: &str = "AUTODEPLOY_ENV_EOF";
pub const UNIT_HEREDOC: &str = "AUTODEPLOY_UNIT_EOF";

/// Host path of the environment file shared by containers and the unit.
pub fn env_file_path(app_name: &str) -> String {
    format!("{}/{}.env", ENV_DIR, app_name)
}

pub fn unit_file_path(app_name: &str) -> String {
    format!("/etc/systemd/system/{}", unit_name(app_name))
}
