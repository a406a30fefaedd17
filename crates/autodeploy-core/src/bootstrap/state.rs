//! Bootstrap states, steps and their parts.

use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::domain::{AutodeployError, RuntimeFamily};

/// A state of the bootstrap machine. `Running` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapState {
    TryPullImage,
    /// Pull for the alternate architecture under emulation.
    TryPullArm64,
    RunPulledExplicit,
    RunPulledDefault,
    CloneSource,
    BuildLocalImage,
    RunLocalExplicit,
    RunLocalDefault,
    NativeRun(RuntimeFamily),
    Failed,
    Running,
}

impl BootstrapState {
    /// Stable identifier used in scripts, logs and traces.
    pub fn id(self) -> String {
        match self {
            BootstrapState::TryPullImage => "TRY_PULL_IMAGE".to_string(),
            BootstrapState::TryPullArm64 => "TRY_PULL_ARM64".to_string(),
            BootstrapState::RunPulledExplicit => "RUN_PULLED_EXPLICIT".to_string(),
            BootstrapState::RunPulledDefault => "RUN_PULLED_DEFAULT".to_string(),
            BootstrapState::CloneSource => "CLONE_SOURCE".to_string(),
            BootstrapState::BuildLocalImage => "BUILD_LOCAL_IMAGE".to_string(),
            BootstrapState::RunLocalExplicit => "RUN_LOCAL_EXPLICIT".to_string(),
            BootstrapState::RunLocalDefault => "RUN_LOCAL_DEFAULT".to_string(),
            BootstrapState::NativeRun(rt) => format!("NATIVE_RUN_{}", rt.label()),
            BootstrapState::Failed => "FAILED".to_string(),
            BootstrapState::Running => "RUNNING".to_string(),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BootstrapState::Failed | BootstrapState::Running)
    }
}

impl std::fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id())
    }
}

impl Serialize for BootstrapState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id())
    }
}

impl FromStr for BootstrapState {
    type Err = AutodeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim().to_ascii_uppercase();
        let state = match id.as_str() {
            "TRY_PULL_IMAGE" => BootstrapState::TryPullImage,
            "TRY_PULL_ARM64" => BootstrapState::TryPullArm64,
            "RUN_PULLED_EXPLICIT" => BootstrapState::RunPulledExplicit,
            "RUN_PULLED_DEFAULT" => BootstrapState::RunPulledDefault,
            "CLONE_SOURCE" => BootstrapState::CloneSource,
            "BUILD_LOCAL_IMAGE" => BootstrapState::BuildLocalImage,
            "RUN_LOCAL_EXPLICIT" => BootstrapState::RunLocalExplicit,
            "RUN_LOCAL_DEFAULT" => BootstrapState::RunLocalDefault,
            "FAILED" => BootstrapState::Failed,
            "RUNNING" => BootstrapState::Running,
            other => other
                .strip_prefix("NATIVE_RUN_")
                .and_then(RuntimeFamily::from_language)
                .map(BootstrapState::NativeRun)
                .ok_or_else(|| AutodeployError::Config(format!("unknown bootstrap state {}", s)))?,
        };
        Ok(state)
    }
}

/// Which image a run step starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    Pulled,
    Local,
}

/// Whether a run overrides the image entrypoint with the plan's command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandMode {
    Explicit,
    Default,
}

/// Condition checked before a step acts. An unmet precondition follows the
/// failure edge without acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "runtime", rename_all = "snake_case")]
pub enum Precondition {
    Always,
    /// The pulled image offers no manifest for the host architecture.
    NoNativeManifest,
    /// The checkout contains a container build descriptor.
    BuildDescriptorPresent,
    /// The checkout contains a marker file for this runtime.
    MarkerFilePresent(RuntimeFamily),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    PullImage,
    EnableEmulationAndPull,
    RunContainer { image: ImageSource, mode: CommandMode },
    CloneSource,
    BuildImage,
    InstallAndServe { runtime: RuntimeFamily },
}

/// Observation that decides whether an action worked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessCheck {
    ImagePresent,
    SourcePresent,
    /// Container observed running, or reachable on the app port.
    ContainerAlive,
    /// Service unit observed active, or reachable on the app port.
    ServiceAlive,
}

/// One node of the bootstrap chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapStep {
    pub id: BootstrapState,
    pub precondition: Precondition,
    pub action: Action,
    pub success_check: SuccessCheck,
    pub next_on_success: BootstrapState,
    pub next_on_failure: BootstrapState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_parsing() {
        for state in [
            BootstrapState::TryPullArm64,
            BootstrapState::NativeRun(RuntimeFamily::Node),
            BootstrapState::Running,
        ] {
            assert_eq!(state.id().parse::<BootstrapState>().unwrap(), state);
        }
        assert!("NATIVE_RUN_COBOL".parse::<BootstrapState>().is_err());
    }

    #[test]
    fn state_serializes_as_id() {
        let json = serde_json::to_string(&BootstrapState::NativeRun(RuntimeFamily::Python)).unwrap();
        assert_eq!(json, "\"NATIVE_RUN_PYTHON\"");
    }
}
