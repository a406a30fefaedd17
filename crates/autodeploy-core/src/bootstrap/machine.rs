//! Strategy state machine
//!
//! Builds the ordered, forward-only chain of bootstrap steps for a plan and
//! runs it against injected host conditions so strategy coverage can be
//! checked without a machine.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use super::state::{
    Action, BootstrapState, BootstrapStep, CommandMode, ImageSource, Precondition, SuccessCheck,
};
use crate::domain::{AutodeployError, DeploymentPlan, Result, RuntimeFamily, Strategy};

/// Edge target before block linking.
#[derive(Debug, Clone, Copy)]
enum Next {
    State(BootstrapState),
    NextBlock,
    Failed,
    Running,
}

struct Draft {
    id: BootstrapState,
    precondition: Precondition,
    action: Action,
    success_check: SuccessCheck,
    on_success: Next,
    on_failure: Next,
}

impl Draft {
    fn new(id: BootstrapState, precondition: Precondition, action: Action, check: SuccessCheck) -> Self {
        Draft {
            id,
            precondition,
            action,
            success_check: check,
            on_success: Next::Running,
            on_failure: Next::NextBlock,
        }
    }

    fn on_success(mut self, next: Next) -> Self {
        self.on_success = next;
        self
    }

    fn on_failure(mut self, next: Next) -> Self {
        self.on_failure = next;
        self
    }
}

fn pulled_image_block() -> Vec<Draft> {
    use BootstrapState::*;
    vec![
        Draft::new(TryPullImage, Precondition::Always, Action::PullImage, SuccessCheck::ImagePresent)
            .on_success(Next::State(RunPulledExplicit))
            .on_failure(Next::State(TryPullArm64)),
        Draft::new(
            TryPullArm64,
            Precondition::NoNativeManifest,
            Action::EnableEmulationAndPull,
            SuccessCheck::ImagePresent,
        )
        .on_success(Next::State(RunPulledExplicit)),
        Draft::new(
            RunPulledExplicit,
            Precondition::Always,
            Action::RunContainer {
                image: ImageSource::Pulled,
                mode: CommandMode::Explicit,
            },
            SuccessCheck::ContainerAlive,
        )
        .on_failure(Next::State(RunPulledDefault)),
        Draft::new(
            RunPulledDefault,
            Precondition::Always,
            Action::RunContainer {
                image: ImageSource::Pulled,
                mode: CommandMode::Default,
            },
            SuccessCheck::ContainerAlive,
        ),
    ]
}

fn clone_block() -> Vec<Draft> {
    vec![Draft::new(
        BootstrapState::CloneSource,
        Precondition::Always,
        Action::CloneSource,
        SuccessCheck::SourcePresent,
    )
    .on_success(Next::NextBlock)
    .on_failure(Next::Failed)]
}

fn local_image_block() -> Vec<Draft> {
    use BootstrapState::*;
    vec![
        Draft::new(
            BuildLocalImage,
            Precondition::BuildDescriptorPresent,
            Action::BuildImage,
            SuccessCheck::ImagePresent,
        )
        .on_success(Next::State(RunLocalExplicit)),
        Draft::new(
            RunLocalExplicit,
            Precondition::Always,
            Action::RunContainer {
                image: ImageSource::Local,
                mode: CommandMode::Explicit,
            },
            SuccessCheck::ContainerAlive,
        )
        .on_failure(Next::State(RunLocalDefault)),
        Draft::new(
            RunLocalDefault,
            Precondition::Always,
            Action::RunContainer {
                image: ImageSource::Local,
                mode: CommandMode::Default,
            },
            SuccessCheck::ContainerAlive,
        ),
    ]
}

/// Native runtimes to try: the inferred one unconditionally, then the other
/// natively supported runtimes when their marker files are present.
fn native_blocks(inferred: Option<RuntimeFamily>) -> Vec<Vec<Draft>> {
    let inferred = inferred.filter(|rt| rt.supports_native());
    let mut order: Vec<RuntimeFamily> = inferred.into_iter().collect();
    order.extend(RuntimeFamily::NATIVE.iter().filter(|rt| Some(**rt) != inferred));

    order
        .into_iter()
        .map(|rt| {
            let precondition = if Some(rt) == inferred {
                Precondition::Always
            } else {
                Precondition::MarkerFilePresent(rt)
            };
            vec![Draft::new(
                BootstrapState::NativeRun(rt),
                precondition,
                Action::InstallAndServe { runtime: rt },
                SuccessCheck::ServiceAlive,
            )]
        })
        .collect()
}

/// The bootstrap chain for one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapMachine {
    steps: Vec<BootstrapStep>,
}

impl BootstrapMachine {
    /// Build the chain following the plan's strategy order. Strategies that
    /// do not apply (pulled image without a reference) are left out.
    pub fn from_plan(plan: &DeploymentPlan) -> Result<Self> {
        let mut blocks: Vec<Vec<Draft>> = Vec::new();
        let mut cloned = false;

        for strategy in &plan.strategy_order {
            if strategy.needs_source() && !cloned {
                blocks.push(clone_block());
                cloned = true;
            }
            match strategy {
                Strategy::PulledImage if plan.image_reference.is_some() => {
                    blocks.push(pulled_image_block())
                }
                Strategy::PulledImage => {
                    debug!("no image reference, pulled-image strategy not applicable")
                }
                Strategy::LocalImage => blocks.push(local_image_block()),
                Strategy::Native => blocks.extend(native_blocks(plan.runtime())),
            }
        }

        let firsts: Vec<Option<BootstrapState>> =
            blocks.iter().map(|b| b.first().map(|d| d.id)).collect();
        let mut steps = Vec::new();
        for (i, block) in blocks.into_iter().enumerate() {
            let next_block = firsts
                .get(i + 1..)
                .and_then(|rest| rest.iter().flatten().next().copied())
                .unwrap_or(BootstrapState::Failed);
            let resolve = |next: Next| match next {
                Next::State(s) => s,
                Next::NextBlock => next_block,
                Next::Failed => BootstrapState::Failed,
                Next::Running => BootstrapState::Running,
            };
            for draft in block {
                steps.push(BootstrapStep {
                    id: draft.id,
                    precondition: draft.precondition,
                    action: draft.action,
                    success_check: draft.success_check,
                    next_on_success: resolve(draft.on_success),
                    next_on_failure: resolve(draft.on_failure),
                });
            }
        }

        let machine = BootstrapMachine { steps };
        machine.validate()?;
        Ok(machine)
    }

    pub fn steps(&self) -> &[BootstrapStep] {
        &self.steps
    }

    /// First state entered; `Failed` for an empty chain.
    pub fn entry(&self) -> BootstrapState {
        self.steps
            .first()
            .map(|s| s.id)
            .unwrap_or(BootstrapState::Failed)
    }

    pub fn step(&self, state: BootstrapState) -> Option<&BootstrapStep> {
        self.steps.iter().find(|s| s.id == state)
    }

    pub fn contains(&self, state: BootstrapState) -> bool {
        self.step(state).is_some()
    }

    /// Check the chain is non-empty, ids are unique, and every edge points
    /// forward or at a terminal state.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(AutodeployError::InvalidPlan(
                "no applicable bootstrap strategy".to_string(),
            ));
        }
        let mut position = HashMap::new();
        for (i, step) in self.steps.iter().enumerate() {
            if step.id.is_terminal() || position.insert(step.id, i).is_some() {
                return Err(AutodeployError::InvalidPlan(format!(
                    "bootstrap state {} declared twice or terminal",
                    step.id
                )));
            }
        }
        for (i, step) in self.steps.iter().enumerate() {
            for target in [step.next_on_success, step.next_on_failure] {
                if target.is_terminal() {
                    continue;
                }
                match position.get(&target) {
                    Some(&j) if j > i => {}
                    _ => {
                        return Err(AutodeployError::InvalidPlan(format!(
                            "bootstrap edge {} -> {} is not forward",
                            step.id, target
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    /// Walk the chain against `host`.
    pub fn simulate(&self, host: &dyn HostConditions) -> BootstrapTrace {
        let mut state = self.entry();
        let mut transitions = Vec::new();

        while let Some(step) = self.step(state) {
            let (outcome, next) = if !host.precondition_holds(step) {
                (StepOutcome::Skipped, step.next_on_failure)
            } else if host.action_succeeds(step) {
                (StepOutcome::Succeeded, step.next_on_success)
            } else {
                (StepOutcome::Failed, step.next_on_failure)
            };
            transitions.push(Transition {
                from: state,
                outcome,
                to: next,
            });
            state = next;
        }

        BootstrapTrace {
            transitions,
            terminal: if state.is_terminal() {
                state
            } else {
                BootstrapState::Failed
            },
        }
    }
}

/// Host behaviour the simulator consults.
pub trait HostConditions {
    fn precondition_holds(&self, step: &BootstrapStep) -> bool;
    fn action_succeeds(&self, step: &BootstrapStep) -> bool;
}

/// Hosts where every precondition holds and every action succeeds unless
/// listed otherwise.
#[derive(Debug, Clone, Default)]
pub struct ScriptedHost {
    failing: HashSet<BootstrapState>,
    unmet: HashSet<BootstrapState>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the action of `state` fail.
    pub fn failing(mut self, state: BootstrapState) -> Self {
        self.failing.insert(state);
        self
    }

    /// Make the precondition of `state` unmet.
    pub fn unmet(mut self, state: BootstrapState) -> Self {
        self.unmet.insert(state);
        self
    }
}

impl HostConditions for ScriptedHost {
    fn precondition_holds(&self, step: &BootstrapStep) -> bool {
        !self.unmet.contains(&step.id)
    }

    fn action_succeeds(&self, step: &BootstrapStep) -> bool {
        !self.failing.contains(&step.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    /// A recoverable strategy step failure.
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: BootstrapState,
    pub outcome: StepOutcome,
    pub to: BootstrapState,
}

/// Recorded walk through the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapTrace {
    pub transitions: Vec<Transition>,
    pub terminal: BootstrapState,
}

impl BootstrapTrace {
    /// States entered, in order, ending with the terminal state.
    pub fn visited(&self) -> Vec<BootstrapState> {
        self.transitions
            .iter()
            .map(|t| t.from)
            .chain(std::iter::once(self.terminal))
            .collect()
    }

    pub fn reached(&self, state: BootstrapState) -> bool {
        self.visited().contains(&state)
    }

    /// Surface exhaustion as the fatal error naming every attempted step.
    pub fn into_result(self) -> Result<Self> {
        if self.terminal == BootstrapState::Failed {
            let attempted = self
                .transitions
                .iter()
                .filter(|t| t.outcome == StepOutcome::Failed)
                .map(|t| t.from.id())
                .collect();
            return Err(AutodeployError::AllStrategiesExhausted {
                stage: "bootstrap".to_string(),
                attempted,
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CloudProvider, SizeTier};
    use BootstrapState::*;

    fn plan(language: &str, image: Option<&str>) -> DeploymentPlan {
        DeploymentPlan {
            app_name: "autodeploy-demo-abc123".into(),
            repo_url: "https://github.com/acme/demo.git".into(),
            git_ref: None,
            language: language.into(),
            language_version: None,
            app_port: 8000,
            start_command: "python app.py".into(),
            env_lines: vec![],
            cloud: CloudProvider::Gcp,
            size_tier: SizeTier::Micro,
            machine_class: "e2-micro".into(),
            disk_size_gb: 20,
            image_reference: image.map(str::to_string),
            strategy_order: if image.is_some() {
                vec![Strategy::PulledImage, Strategy::LocalImage, Strategy::Native]
            } else {
                vec![Strategy::LocalImage, Strategy::Native]
            },
        }
    }

    fn ids(machine: &BootstrapMachine) -> Vec<String> {
        machine.steps().iter().map(|s| s.id.id()).collect()
    }

    #[test]
    fn full_chain_order_with_image() {
        let machine = BootstrapMachine::from_plan(&plan("python", Some("img:1"))).unwrap();
        assert_eq!(
            ids(&machine),
            vec![
                "TRY_PULL_IMAGE",
                "TRY_PULL_ARM64",
                "RUN_PULLED_EXPLICIT",
                "RUN_PULLED_DEFAULT",
                "CLONE_SOURCE",
                "BUILD_LOCAL_IMAGE",
                "RUN_LOCAL_EXPLICIT",
                "RUN_LOCAL_DEFAULT",
                "NATIVE_RUN_PYTHON",
                "NATIVE_RUN_NODE",
                "NATIVE_RUN_GO",
                "NATIVE_RUN_RUBY",
            ]
        );
        let clone = machine.step(CloneSource).unwrap();
        assert_eq!(clone.next_on_success, BuildLocalImage);
        assert_eq!(clone.next_on_failure, Failed);
        let build = machine.step(BuildLocalImage).unwrap();
        assert_eq!(build.next_on_failure, NativeRun(RuntimeFamily::Python));
        assert_eq!(
            machine.step(NativeRun(RuntimeFamily::Ruby)).unwrap().next_on_failure,
            Failed
        );
    }

    #[test]
    fn pull_steps_absent_without_image() {
        let machine = BootstrapMachine::from_plan(&plan("node", None)).unwrap();
        assert_eq!(machine.entry(), CloneSource);
        assert!(!machine.contains(TryPullImage));
        assert_eq!(ids(&machine)[4], "NATIVE_RUN_NODE");
        assert_eq!(
            machine.step(NativeRun(RuntimeFamily::Python)).unwrap().precondition,
            Precondition::MarkerFilePresent(RuntimeFamily::Python)
        );
    }

    #[test]
    fn pull_failure_on_every_arch_reaches_clone_not_failed() {
        let machine = BootstrapMachine::from_plan(&plan("python", Some("img:1"))).unwrap();
        let host = ScriptedHost::new().failing(TryPullImage).failing(TryPullArm64);
        let trace = machine.simulate(&host);
        assert_eq!(
            &trace.visited()[..4],
            &[TryPullImage, TryPullArm64, CloneSource, BuildLocalImage]
        );
        assert_eq!(trace.terminal, Running);
    }

    #[test]
    fn native_manifest_present_skips_emulated_pull() {
        let machine = BootstrapMachine::from_plan(&plan("python", Some("img:1"))).unwrap();
        let host = ScriptedHost::new().failing(TryPullImage).unmet(TryPullArm64);
        let trace = machine.simulate(&host);
        assert_eq!(trace.transitions[1].outcome, StepOutcome::Skipped);
        assert_eq!(trace.transitions[1].to, CloneSource);
    }

    #[test]
    fn explicit_run_failure_falls_back_to_default_entrypoint() {
        let machine = BootstrapMachine::from_plan(&plan("python", Some("img:1"))).unwrap();
        let trace = machine.simulate(&ScriptedHost::new().failing(RunPulledExplicit));
        assert_eq!(
            trace.visited(),
            vec![TryPullImage, RunPulledExplicit, RunPulledDefault, Running]
        );
    }

    #[test]
    fn no_dockerfile_goes_native() {
        let machine = BootstrapMachine::from_plan(&plan("go", None)).unwrap();
        let trace = machine.simulate(&ScriptedHost::new().unmet(BuildLocalImage));
        assert_eq!(
            trace.visited(),
            vec![CloneSource, BuildLocalImage, NativeRun(RuntimeFamily::Go), Running]
        );
    }

    #[test]
    fn exhaustion_is_fatal_and_names_attempts() {
        let machine = BootstrapMachine::from_plan(&plan("python", None)).unwrap();
        let mut host = ScriptedHost::new().unmet(BuildLocalImage);
        for rt in RuntimeFamily::NATIVE {
            host = host.failing(NativeRun(rt));
        }
        let trace = machine.simulate(&host);
        assert_eq!(trace.terminal, Failed);
        let err = trace.into_result().unwrap_err();
        match err {
            AutodeployError::AllStrategiesExhausted { stage, attempted } => {
                assert_eq!(stage, "bootstrap");
                assert_eq!(attempted[0], "NATIVE_RUN_PYTHON");
                assert_eq!(attempted.len(), 4);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn clone_failure_fails_immediately() {
        let machine = BootstrapMachine::from_plan(&plan("python", None)).unwrap();
        let trace = machine.simulate(&ScriptedHost::new().failing(CloneSource));
        assert_eq!(trace.visited(), vec![CloneSource, Failed]);
    }

    #[test]
    fn unsupported_language_still_gets_native_fallbacks() {
        let machine = BootstrapMachine::from_plan(&plan("rust", None)).unwrap();
        assert!(!machine.contains(NativeRun(RuntimeFamily::Rust)));
        assert!(machine
            .steps()
            .iter()
            .filter(|s| matches!(s.id, NativeRun(_)))
            .all(|s| matches!(s.precondition, Precondition::MarkerFilePresent(_))));
    }

    #[test]
    fn empty_strategy_order_is_rejected() {
        let mut p = plan("python", None);
        p.strategy_order.clear();
        assert!(BootstrapMachine::from_plan(&p).is_err());
    }

    #[test]
    fn every_edge_points_forward() {
        let machine = BootstrapMachine::from_plan(&plan("node", Some("img"))).unwrap();
        assert!(machine.validate().is_ok());
        let mut broken = machine.clone();
        broken.steps[4].next_on_failure = TryPullImage;
        assert!(broken.validate().is_err());
    }
}
