//! Deployment plan builder
//!
//! Derives a [`DeploymentPlan`] from a normalized report plus operator
//! overrides: port, start command, ordered env lines, machine sizing, image
//! reference, strategy order and the stable application identity.

use repo_evidence::{parse_repo_url, repo_name_from_url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::ProvisionConfig;
use crate::domain::{
    default_start_command, AutodeployError, DeploymentPlan, EnvLine, EnvironmentReport, Result,
    RuntimeFamily, SizeTier, Strategy,
};
use crate::render::escape::is_env_key;

/// Host address the application is told to bind.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Smallest disk the planner accepts.
pub const MIN_DISK_SIZE_GB: u32 = 10;

/// Dependencies that call for the largest machine tier.
pub const ML_MARKERS: &[&str] = &[
    "torch",
    "tensorflow",
    "jax",
    "transformers",
    "xgboost",
    "lightgbm",
    "cuda",
];

/// Dependencies that call for a standard machine.
pub const HEAVY_MARKERS: &[&str] = &["pandas", "scikit", "opencv", "playwright", "chromium"];

/// Web frameworks that warrant more than the smallest machine.
pub const WEB_FRAMEWORKS: &[&str] = &["django", "flask", "fastapi", "express", "rails", "spring"];

/// Operator-supplied values that take precedence over inference.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlanOverrides {
    pub port: Option<u16>,
    pub start_command: Option<String>,
    pub machine_class: Option<String>,
    pub disk_size_gb: Option<u32>,
    pub image_reference: Option<String>,
    pub git_ref: Option<String>,
    /// Applied in order; later entries win.
    pub env: Vec<EnvLine>,
}

impl PlanOverrides {
    /// Parse a `KEY=VALUE` command-line assignment.
    pub fn parse_env_assignment(raw: &str) -> Result<EnvLine> {
        let (key, value) = raw.split_once('=').ok_or_else(|| {
            AutodeployError::InvalidPlan(format!("env override {:?} is not KEY=VALUE", raw))
        })?;
        let key = key.trim();
        if !is_env_key(key) {
            return Err(AutodeployError::InvalidPlan(format!(
                "invalid env var name {:?}",
                key
            )));
        }
        Ok(EnvLine::new(key, value))
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Sizing tier from the dependency and framework profile.
pub fn size_tier(report: &EnvironmentReport) -> SizeTier {
    let names: Vec<String> = report
        .dependency_names()
        .chain(report.frameworks.iter().map(|f| f.to_lowercase()))
        .collect();
    let mentions = |markers: &[&str]| names.iter().any(|n| markers.iter().any(|m| n.contains(m)));

    if mentions(ML_MARKERS) {
        SizeTier::Standard4
    } else if mentions(HEAVY_MARKERS) {
        SizeTier::Standard2
    } else if RuntimeFamily::from_language(&report.language) == Some(RuntimeFamily::Node)
        || names.iter().any(|n| WEB_FRAMEWORKS.contains(&n.as_str()))
    {
        SizeTier::Small
    } else {
        SizeTier::Micro
    }
}

/// Stable identity for a repository: `autodeploy-<name>-<6 hex>`.
///
/// Equivalent spellings of the same GitHub repository map to one identity.
pub fn app_identity(repo_url: &str) -> String {
    let (name, canonical) = match parse_repo_url(repo_url) {
        Ok(repo) => (repo.repo.clone(), repo.clone_url()),
        Err(_) => {
            let trimmed = repo_url.trim().trim_end_matches('/');
            let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
            (repo_name_from_url(trimmed), trimmed.to_string())
        }
    };

    let mut slug = String::new();
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let mut slug: String = slug.trim_matches('-').chars().take(30).collect();
    slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        slug = "app".to_string();
    }

    let digest = hex::encode(Sha256::digest(canonical.to_lowercase().as_bytes()));
    format!("autodeploy-{}-{}", slug, &digest[..6])
}

/// Builds plans against one provisioning configuration.
pub struct DeploymentPlanBuilder<'a> {
    provision: &'a ProvisionConfig,
}

impl<'a> DeploymentPlanBuilder<'a> {
    pub fn new(provision: &'a ProvisionConfig) -> Self {
        Self { provision }
    }

    pub fn build(
        &self,
        repo_url: &str,
        report: &EnvironmentReport,
        overrides: &PlanOverrides,
    ) -> Result<DeploymentPlan> {
        if repo_url.trim().is_empty() {
            return Err(AutodeployError::InvalidPlan("repository URL is empty".into()));
        }
        let parsed = parse_repo_url(repo_url).ok();

        let app_port = overrides.port.unwrap_or_else(|| report.primary_port());
        if app_port == 0 {
            return Err(AutodeployError::InvalidPlan("port 0 is not usable".into()));
        }

        let start_command = non_empty(&overrides.start_command)
            .or_else(|| report.start_commands.first().cloned())
            .unwrap_or_else(|| default_start_command(&report.language).to_string());

        let env_lines = self.env_lines(report, overrides, app_port)?;

        let size_tier = size_tier(report);
        let machine_class = non_empty(&overrides.machine_class)
            .unwrap_or_else(|| self.provision.cloud.machine_class(size_tier).to_string());
        let disk_size_gb = overrides
            .disk_size_gb
            .unwrap_or_else(|| size_tier.default_disk_gb());
        if disk_size_gb < MIN_DISK_SIZE_GB {
            return Err(AutodeployError::InvalidPlan(format!(
                "disk size {} GB is below the {} GB minimum",
                disk_size_gb, MIN_DISK_SIZE_GB
            )));
        }

        let image_reference = non_empty(&overrides.image_reference);
        let strategy_order = if image_reference.is_some() {
            vec![Strategy::PulledImage, Strategy::LocalImage, Strategy::Native]
        } else {
            vec![Strategy::LocalImage, Strategy::Native]
        };

        let plan = DeploymentPlan {
            app_name: app_identity(repo_url),
            repo_url: parsed
                .as_ref()
                .map(|r| r.clone_url())
                .unwrap_or_else(|| repo_url.trim().to_string()),
            git_ref: non_empty(&overrides.git_ref)
                .or_else(|| parsed.as_ref().and_then(|r| r.git_ref.clone())),
            language: report.language.clone(),
            language_version: report.language_version.clone(),
            app_port,
            start_command,
            env_lines,
            cloud: self.provision.cloud,
            size_tier,
            machine_class,
            disk_size_gb,
            image_reference,
            strategy_order,
        };

        info!(
            app = %plan.app_name,
            port = plan.app_port,
            machine = %plan.machine_class,
            disk_gb = plan.disk_size_gb,
            strategies = ?plan.strategy_order,
            "deployment plan resolved"
        );
        Ok(plan)
    }

    fn env_lines(
        &self,
        report: &EnvironmentReport,
        overrides: &PlanOverrides,
        app_port: u16,
    ) -> Result<Vec<EnvLine>> {
        let mut lines: Vec<EnvLine> = Vec::new();
        let mut upsert = |line: EnvLine| {
            if let Some(i) = lines.iter().position(|l| l.key == line.key) {
                lines[i].value = line.value;
            } else {
                lines.push(line);
            }
        };

        for var in &report.env_vars {
            if let Some(default) = var.default.as_deref().filter(|d| !d.is_empty()) {
                upsert(EnvLine::new(var.name.clone(), default));
            }
        }
        // The resolved bind address replaces report defaults; only operator
        // overrides may change it.
        upsert(EnvLine::new("PORT", app_port.to_string()));
        upsert(EnvLine::new("HOST", DEFAULT_HOST));
        for line in &overrides.env {
            if !is_env_key(&line.key) {
                return Err(AutodeployError::InvalidPlan(format!(
                    "invalid env var name {:?}",
                    line.key
                )));
            }
            upsert(line.clone());
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CloudProvider, Dependency, EnvVar};

    fn report() -> EnvironmentReport {
        EnvironmentReport {
            language: "python".into(),
            ..Default::default()
        }
    }

    fn dep(name: &str) -> Dependency {
        Dependency {
            name: name.into(),
            version: None,
            source: "requirements.txt".into(),
        }
    }

    fn var(name: &str, default: Option<&str>) -> EnvVar {
        EnvVar {
            name: name.into(),
            required: false,
            default: default.map(str::to_string),
            description: String::new(),
        }
    }

    fn build(report: &EnvironmentReport, overrides: &PlanOverrides) -> DeploymentPlan {
        let provision = ProvisionConfig::default();
        DeploymentPlanBuilder::new(&provision)
            .build("https://github.com/acme/Hello_World", report, overrides)
            .unwrap()
    }

    #[test]
    fn defaults_for_bare_python_report() {
        let plan = build(&report(), &PlanOverrides::default());
        assert_eq!(plan.app_port, 8000);
        assert_eq!(plan.start_command, "python app.py");
        assert_eq!(
            plan.env_lines,
            vec![EnvLine::new("PORT", "8000"), EnvLine::new("HOST", "0.0.0.0")]
        );
        assert_eq!(plan.size_tier, SizeTier::Micro);
        assert_eq!(plan.machine_class, "e2-micro");
        assert_eq!(plan.disk_size_gb, 20);
        assert_eq!(plan.strategy_order, vec![Strategy::LocalImage, Strategy::Native]);
        assert_eq!(plan.repo_url, "https://github.com/acme/Hello_World.git");
        assert!(plan.app_name.starts_with("autodeploy-hello-world-"));
    }

    #[test]
    fn first_port_and_start_command_win() {
        let mut r = report();
        r.ports = vec![8080, 3000, 22];
        r.start_commands = vec!["gunicorn app:app".into(), "flask run".into()];
        let plan = build(&r, &PlanOverrides::default());
        assert_eq!(plan.app_port, 8080);
        assert_eq!(plan.start_command, "gunicorn app:app");
        assert_eq!(plan.env_value("PORT"), Some("8080"));
    }

    #[test]
    fn env_lines_order_and_overrides() {
        let mut r = report();
        r.env_vars = vec![
            var("DEBUG", Some("0")),
            var("SECRET", None),
            var("HOST", Some("127.0.0.1")),
            var("EMPTY", Some("")),
        ];
        let overrides = PlanOverrides {
            port: Some(9000),
            env: vec![
                EnvLine::new("DEBUG", "1"),
                EnvLine::new("EXTRA", "a=b"),
                EnvLine::new("DEBUG", "2"),
            ],
            ..Default::default()
        };
        let plan = build(&r, &overrides);
        let rendered: Vec<String> = plan.env_lines.iter().map(|l| l.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["DEBUG=2", "HOST=0.0.0.0", "PORT=9000", "EXTRA=a=b"]
        );
    }

    #[test]
    fn resolved_port_replaces_report_default() {
        let mut r = report();
        r.ports = vec![8080, 3000];
        r.env_vars = vec![var("PORT", Some("3000")), var("LOG_LEVEL", Some("info"))];
        let plan = build(&r, &PlanOverrides::default());
        assert_eq!(plan.app_port, 8080);
        assert_eq!(plan.env_value("PORT"), Some("8080"));
        assert_eq!(plan.env_value("HOST"), Some("0.0.0.0"));
        let keys: Vec<&str> = plan.env_lines.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec!["PORT", "LOG_LEVEL", "HOST"]);
    }

    #[test]
    fn operator_env_wins_over_resolved_bind() {
        let overrides = PlanOverrides {
            env: vec![EnvLine::new("HOST", "127.0.0.1")],
            ..Default::default()
        };
        let plan = build(&report(), &overrides);
        assert_eq!(plan.env_value("HOST"), Some("127.0.0.1"));
        assert_eq!(plan.env_value("PORT"), Some("8000"));
    }

    #[test]
    fn invalid_override_key_is_rejected() {
        let provision = ProvisionConfig::default();
        let overrides = PlanOverrides {
            env: vec![EnvLine::new("BAD KEY", "x")],
            ..Default::default()
        };
        let err = DeploymentPlanBuilder::new(&provision)
            .build("https://github.com/a/b", &report(), &overrides)
            .unwrap_err();
        assert!(matches!(err, AutodeployError::InvalidPlan(_)));
    }

    #[test]
    fn sizing_tiers() {
        let mut r = report();
        r.dependencies = vec![dep("flask")];
        assert_eq!(size_tier(&r), SizeTier::Small);
        r.dependencies.push(dep("pandas"));
        assert_eq!(size_tier(&r), SizeTier::Standard2);
        r.dev_dependencies = vec![dep("torch-vision")];
        assert_eq!(size_tier(&r), SizeTier::Standard4);

        let node = EnvironmentReport {
            language: "node".into(),
            ..Default::default()
        };
        assert_eq!(size_tier(&node), SizeTier::Small);
    }

    #[test]
    fn aws_machine_classes_and_overrides() {
        let provision = ProvisionConfig {
            cloud: CloudProvider::Aws,
            ..Default::default()
        };
        let mut r = report();
        r.dependencies = vec![dep("tensorflow")];
        let plan = DeploymentPlanBuilder::new(&provision)
            .build("https://github.com/a/b", &r, &PlanOverrides::default())
            .unwrap();
        assert_eq!(plan.machine_class, "t3.xlarge");
        assert_eq!(plan.disk_size_gb, 80);

        let overrides = PlanOverrides {
            machine_class: Some("t3.medium".into()),
            disk_size_gb: Some(5),
            ..Default::default()
        };
        assert!(DeploymentPlanBuilder::new(&provision)
            .build("https://github.com/a/b", &r, &overrides)
            .is_err());
    }

    #[test]
    fn image_reference_enables_pull_strategy() {
        let overrides = PlanOverrides {
            image_reference: Some(" ghcr.io/acme/app:1 ".into()),
            ..Default::default()
        };
        let plan = build(&report(), &overrides);
        assert_eq!(plan.image_reference.as_deref(), Some("ghcr.io/acme/app:1"));
        assert_eq!(plan.strategy_order[0], Strategy::PulledImage);
    }

    #[test]
    fn identity_is_stable_across_url_spellings() {
        let a = app_identity("https://github.com/acme/web");
        let b = app_identity("https://github.com/acme/web.git");
        let c = app_identity("git@github.com:acme/web.git");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_ne!(a, app_identity("https://github.com/acme/other"));
        assert_eq!(a.len(), "autodeploy-web-".len() + 6);
    }

    #[test]
    fn branch_from_tree_url() {
        let provision = ProvisionConfig::default();
        let plan = DeploymentPlanBuilder::new(&provision)
            .build(
                "https://github.com/acme/web/tree/release",
                &report(),
                &PlanOverrides::default(),
            )
            .unwrap();
        assert_eq!(plan.git_ref.as_deref(), Some("release"));
        assert_eq!(plan.repo_url, "https://github.com/acme/web.git");
    }

    #[test]
    fn parse_env_assignment_forms() {
        assert_eq!(
            PlanOverrides::parse_env_assignment("A=b=c").unwrap(),
            EnvLine::new("A", "b=c")
        );
        assert!(PlanOverrides::parse_env_assignment("novalue").is_err());
        assert!(PlanOverrides::parse_env_assignment("1X=y").is_err());
    }
}
