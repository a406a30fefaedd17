//! End-to-end orchestration.
//!
//! Stages run strictly in order: evidence, judgment, normalization, plan,
//! bootstrap synthesis, rendering. [`AutodeployPipeline::ask`] is the only
//! place the judgment oracle is called.

use std::sync::Arc;

use repo_evidence::{prioritize_candidates, CorpusAssembler, EvidenceCorpus, EvidenceSource};
use tracing::{debug, info, warn};

use crate::bootstrap::{synthesize_script, BootstrapMachine};
use crate::config::AutodeployConfig;
use crate::domain::{DeploymentPlan, EnvironmentReport, Result};
use crate::normalize::{parse_path_selection, ConfigNormalizer, JudgmentSource};
use crate::oracle::{
    consult, environment_report_prompt, oracle_from_config, path_selection_prompt,
    JudgmentOracle, PromptContext,
};
use crate::planner::{DeploymentPlanBuilder, PlanOverrides};
use crate::render::{ArtifactBundle, ArtifactRenderer, TargetDescriptor};

/// What was learned about a repository.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub repo_url: String,
    pub tree_size: usize,
    pub candidates: Vec<String>,
    pub corpus: EvidenceCorpus,
    pub report: EnvironmentReport,
    pub judgment_source: JudgmentSource,
}

/// A bootstrap machine and its script rendering.
#[derive(Debug, Clone)]
pub struct SynthesizedBootstrap {
    pub machine: BootstrapMachine,
    pub script: String,
}

/// Output of a full run.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub analysis: Analysis,
    pub plan: DeploymentPlan,
    pub bootstrap: SynthesizedBootstrap,
    pub bundle: ArtifactBundle,
}

pub struct AutodeployPipeline {
    config: AutodeployConfig,
    oracle: Arc<dyn JudgmentOracle>,
}

impl AutodeployPipeline {
    pub fn new(config: AutodeployConfig, oracle: Arc<dyn JudgmentOracle>) -> Self {
        Self { config, oracle }
    }

    /// Build the pipeline with the oracle described by `config`.
    pub fn from_config(config: AutodeployConfig) -> Result<Self> {
        config.validate()?;
        let oracle = oracle_from_config(&config.oracle)?;
        Ok(Self::new(config, oracle))
    }

    pub fn config(&self) -> &AutodeployConfig {
        &self.config
    }

    /// Consult the oracle. Failures and timeouts are logged and yield `None`
    /// so the caller falls back to deterministic behaviour.
    async fn ask(&self, prompt: &PromptContext) -> Option<String> {
        if !self.oracle.is_enabled() {
            debug!(purpose = ?prompt.purpose, "oracle disabled, skipping");
            return None;
        }
        match consult(self.oracle.as_ref(), prompt, self.config.oracle.timeout()).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(oracle = self.oracle.name(), purpose = ?prompt.purpose, error = %e, "oracle judgment failed");
                None
            }
        }
    }

    /// Collect evidence and normalize a report for the repository.
    pub async fn analyze(&self, source: &dyn EvidenceSource, repo_url: &str) -> Result<Analysis> {
        let budget = self.config.budget;
        let tree = source.fetch_tree().await?;
        info!(source = %source.describe(), paths = tree.len(), "repository tree fetched");

        let picks = if tree.is_empty() {
            Vec::new()
        } else {
            let prompt = path_selection_prompt(repo_url, &tree, budget.max_files);
            self.ask(&prompt)
                .await
                .map(|text| parse_path_selection(&text))
                .unwrap_or_default()
        };
        let candidates = prioritize_candidates(&tree, &picks, budget.max_files);
        debug!(picks = picks.len(), candidates = candidates.len(), "candidates prioritised");

        let corpus = CorpusAssembler::new(budget)
            .assemble(source, &candidates)
            .await;
        info!(
            files = corpus.len(),
            used_bytes = corpus.used_bytes(),
            cap = corpus.budget_cap(),
            "evidence corpus assembled"
        );

        let raw = if corpus.is_empty() {
            None
        } else {
            self.ask(&environment_report_prompt(repo_url, &corpus)).await
        };
        let normalized = ConfigNormalizer::normalize(raw.as_deref(), &corpus);
        info!(
            language = %normalized.report.language,
            port = normalized.report.primary_port(),
            source = ?normalized.source,
            "environment report normalized"
        );

        Ok(Analysis {
            repo_url: repo_url.to_string(),
            tree_size: tree.len(),
            candidates,
            corpus,
            report: normalized.report,
            judgment_source: normalized.source,
        })
    }

    pub fn plan(
        &self,
        repo_url: &str,
        report: &EnvironmentReport,
        overrides: &PlanOverrides,
    ) -> Result<DeploymentPlan> {
        DeploymentPlanBuilder::new(&self.config.provision).build(repo_url, report, overrides)
    }

    /// Build the bootstrap machine for `target` and render its script.
    pub fn synthesize(
        &self,
        plan: &DeploymentPlan,
        target: TargetDescriptor,
    ) -> Result<SynthesizedBootstrap> {
        let scoped = plan.restricted_to(target.strategies());
        let machine = BootstrapMachine::from_plan(&scoped)?;
        let script = synthesize_script(&scoped, &machine, &self.config.provision.app_dir)?;
        debug!(steps = machine.steps().len(), entry = %machine.entry(), "bootstrap synthesized");
        Ok(SynthesizedBootstrap { machine, script })
    }

    pub fn render(
        &self,
        target: TargetDescriptor,
        plan: &DeploymentPlan,
        bootstrap: &SynthesizedBootstrap,
    ) -> Result<ArtifactBundle> {
        ArtifactRenderer::new(&self.config.provision).render(target, plan, &bootstrap.script)
    }

    /// Analyze, plan, synthesize and render in one pass.
    pub async fn run(
        &self,
        source: &dyn EvidenceSource,
        repo_url: &str,
        overrides: &PlanOverrides,
        target: TargetDescriptor,
    ) -> Result<Deployment> {
        let analysis = self.analyze(source, repo_url).await?;
        let plan = self.plan(repo_url, &analysis.report, overrides)?;
        let bootstrap = self.synthesize(&plan, target)?;
        let bundle = self.render(target, &plan, &bootstrap)?;
        Ok(Deployment {
            analysis,
            plan,
            bootstrap,
            bundle,
        })
    }
}
