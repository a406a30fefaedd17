//! Autodeploy - infer how to run a repository and bring it up
//!
//! The `autodeploy` command drives the inference pipeline end to end.
//!
//! ## Commands
//!
//! - `analyze`: Collect evidence and write `env_report.json`
//! - `plan`: Turn a report plus overrides into a deployment plan
//! - `render`: Write an artifact bundle for a target
//! - `up`: Analyze, plan and render in one go, optionally applying the bundle
//! - `bootstrap`: Print the bootstrap script or a simulated trace
//! - `destroy`: Tear down what `up --apply` created

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

use autodeploy_core::bundle::{PLAN_FILE, REPORT_FILE};
use autodeploy_core::render::DOCKERFILE_ARTIFACT;
use autodeploy_core::{
    read_report_json, render_bundle_summary_md, write_bundle, write_plan_json, write_report_json,
    AutodeployConfig, AutodeployPipeline, BootstrapState, BundleManifest, CloudProvider,
    DeploymentPlan, EnvironmentReport, JudgmentSource, PlanOverrides, ScriptedHost,
    TargetDescriptor,
};
use autodeploy_provision::{
    apply_stages, destroy_stages, docker_build_stage, plan_stages, ProvisionPipeline,
    ProvisionResult, ProvisionSpec, StageConfig,
};
use repo_evidence::{parse_repo_url, EvidenceSource, GithubSource, LocalSource};

#[derive(Parser)]
#[command(name = "autodeploy")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Infer how to run a repository and synthesize its deployment", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Configuration sources; flags win over the file, the file over the environment.
#[derive(Args, Debug, Clone, Default)]
struct SettingsArgs {
    /// TOML configuration file
    #[arg(long, global = true, env = "AUTODEPLOY_CONFIG")]
    config: Option<PathBuf>,

    /// Cloud provider (gcp or aws)
    #[arg(long, global = true)]
    cloud: Option<CloudProvider>,

    /// Cloud project
    #[arg(long, global = true)]
    project: Option<String>,

    /// Cloud region
    #[arg(long, global = true)]
    region: Option<String>,

    /// Cloud zone
    #[arg(long, global = true)]
    zone: Option<String>,
}

/// Where the repository comes from.
#[derive(Args, Debug, Clone, Default)]
struct RepoArgs {
    /// GitHub repository URL
    #[arg(required_unless_present = "local")]
    repo: Option<String>,

    /// Analyze a local checkout instead of fetching from GitHub
    #[arg(long, conflicts_with = "repo")]
    local: Option<PathBuf>,

    /// Clone URL recorded in the plan when using --local
    #[arg(long, requires = "local")]
    repo_url: Option<String>,
}

/// Operator values that take precedence over inference.
#[derive(Args, Debug, Clone, Default)]
struct OverrideArgs {
    /// Application port
    #[arg(long)]
    port: Option<u16>,

    /// Start command
    #[arg(long)]
    start_command: Option<String>,

    /// Machine class (e.g. e2-small, t3.micro)
    #[arg(long)]
    machine_class: Option<String>,

    /// Boot disk size in GB
    #[arg(long)]
    disk_size: Option<u32>,

    /// Prebuilt container image to try first
    #[arg(long)]
    image: Option<String>,

    /// Branch, tag or commit to deploy
    #[arg(long = "ref")]
    git_ref: Option<String>,

    /// Environment variable KEY=VALUE (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect evidence and write the environment report
    Analyze {
        #[command(flatten)]
        repo: RepoArgs,

        /// Output path for the report
        #[arg(short, long, default_value = REPORT_FILE)]
        out: PathBuf,
    },

    /// Build a deployment plan from a report
    Plan {
        /// Environment report (JSON)
        #[arg(long, default_value = REPORT_FILE)]
        report: PathBuf,

        /// Repository URL the plan deploys
        #[arg(long)]
        repo_url: String,

        #[command(flatten)]
        overrides: OverrideArgs,

        /// Output path for the plan (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Render an artifact bundle from a report
    Render {
        /// Environment report (JSON)
        #[arg(long, default_value = REPORT_FILE)]
        report: PathBuf,

        /// Repository URL the bundle deploys
        #[arg(long)]
        repo_url: String,

        #[command(flatten)]
        overrides: OverrideArgs,

        /// Deployment target (container, vm, vm-gcp, vm-aws, native)
        #[arg(short, long, default_value = "vm")]
        target: TargetDescriptor,

        /// Bundle directory
        #[arg(short, long, default_value = "autodeploy-bundle")]
        out: PathBuf,
    },

    /// Analyze, plan and render; optionally provision the result
    Up {
        #[command(flatten)]
        repo: RepoArgs,

        #[command(flatten)]
        overrides: OverrideArgs,

        /// Deployment target (container, vm, vm-gcp, vm-aws, native)
        #[arg(short, long, default_value = "vm")]
        target: TargetDescriptor,

        /// Bundle directory
        #[arg(short, long, default_value = "autodeploy-bundle")]
        out: PathBuf,

        /// Run terraform (or docker build) against the bundle
        #[arg(long)]
        apply: bool,

        /// With --apply, stop after `terraform plan`
        #[arg(long, requires = "apply")]
        dry_run: bool,
    },

    /// Print the bootstrap script for a plan, or simulate it
    Bootstrap {
        /// Deployment plan (JSON)
        #[arg(long, default_value = PLAN_FILE)]
        plan: PathBuf,

        /// Deployment target (container, vm, vm-gcp, vm-aws, native)
        #[arg(short, long, default_value = "vm")]
        target: TargetDescriptor,

        /// Print the state trace instead of the script
        #[arg(long)]
        simulate: bool,

        /// State whose action fails during simulation (repeatable)
        #[arg(long = "fail", value_name = "STATE", requires = "simulate")]
        fail: Vec<BootstrapState>,

        /// State whose precondition is unmet during simulation (repeatable)
        #[arg(long = "unmet", value_name = "STATE", requires = "simulate")]
        unmet: Vec<BootstrapState>,
    },

    /// Destroy infrastructure created from a bundle
    Destroy {
        /// Bundle directory
        #[arg(default_value = "autodeploy-bundle")]
        bundle: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    autodeploy_core::init_tracing(cli.json, level);

    let config = load_config(&cli.settings)?;

    match cli.command {
        Commands::Analyze { repo, out } => cmd_analyze(config, &repo, &out).await,
        Commands::Plan {
            report,
            repo_url,
            overrides,
            out,
        } => cmd_plan(config, &report, &repo_url, &overrides, out.as_deref()),
        Commands::Render {
            report,
            repo_url,
            overrides,
            target,
            out,
        } => cmd_render(config, &report, &repo_url, &overrides, target, &out),
        Commands::Up {
            repo,
            overrides,
            target,
            out,
            apply,
            dry_run,
        } => cmd_up(config, &repo, &overrides, target, &out, apply, dry_run).await,
        Commands::Bootstrap {
            plan,
            target,
            simulate,
            fail,
            unmet,
        } => cmd_bootstrap(config, &plan, target, simulate, &fail, &unmet, cli.json),
        Commands::Destroy { bundle } => cmd_destroy(&bundle).await,
    }
}

/// Resolve configuration: file (or environment), then command-line flags.
fn load_config(settings: &SettingsArgs) -> Result<AutodeployConfig> {
    let config = match &settings.config {
        Some(path) => AutodeployConfig::load(path)?,
        None => AutodeployConfig::from_env()?,
    };
    Ok(apply_settings(config, settings))
}

fn apply_settings(mut config: AutodeployConfig, settings: &SettingsArgs) -> AutodeployConfig {
    if let Some(cloud) = settings.cloud {
        config.provision.cloud = cloud;
    }
    if let Some(project) = &settings.project {
        config.provision.project = Some(project.clone());
    }
    if let Some(region) = &settings.region {
        config.provision.region = region.clone();
    }
    if let Some(zone) = &settings.zone {
        config.provision.zone = zone.clone();
    }
    config
}

fn build_overrides(args: &OverrideArgs) -> Result<PlanOverrides> {
    let env = args
        .env
        .iter()
        .map(|raw| PlanOverrides::parse_env_assignment(raw))
        .collect::<autodeploy_core::Result<Vec<_>>>()?;
    Ok(PlanOverrides {
        port: args.port,
        start_command: args.start_command.clone(),
        machine_class: args.machine_class.clone(),
        disk_size_gb: args.disk_size,
        image_reference: args.image.clone(),
        git_ref: args.git_ref.clone(),
        env,
    })
}

/// Align the provisioning cloud with an explicit `vm-<cloud>` target.
fn align_cloud(mut config: AutodeployConfig, target: TargetDescriptor) -> AutodeployConfig {
    if let TargetDescriptor::VmImage { provider } = target {
        config.provision.cloud = provider;
    }
    config
}

/// Open the evidence source and return it with the URL the plan records.
async fn open_source(
    config: &AutodeployConfig,
    args: &RepoArgs,
) -> Result<(Box<dyn EvidenceSource>, String, Option<String>)> {
    if let Some(dir) = &args.local {
        if !dir.is_dir() {
            bail!("{} is not a directory", dir.display());
        }
        let root = dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", dir.display()))?;
        info!(path = %root.display(), "Using local checkout");
        let repo_url = match &args.repo_url {
            Some(url) => url.clone(),
            None => {
                warn!("No --repo-url given; remote hosts will not be able to clone this checkout");
                format!("file://{}", root.display())
            }
        };
        return Ok((Box::new(LocalSource::new(root)), repo_url, None));
    }

    let Some(url) = &args.repo else {
        bail!("Either a repository URL or --local is required");
    };
    let repo = parse_repo_url(url)?;
    let clone_url = repo.clone_url();
    let source = GithubSource::connect(repo, config.github.clone())
        .await
        .context("Failed to resolve repository")?;
    let git_ref = source.git_ref().to_string();
    Ok((Box::new(source), clone_url, Some(git_ref)))
}

fn read_report(path: &Path) -> Result<EnvironmentReport> {
    let report = read_report_json(path)?;
    let violations = report.violations();
    if !violations.is_empty() {
        bail!(
            "{} is not a valid environment report: {}",
            path.display(),
            violations.join("; ")
        );
    }
    Ok(report)
}

fn read_plan(path: &Path) -> Result<DeploymentPlan> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Collect evidence and write the environment report
async fn cmd_analyze(config: AutodeployConfig, repo: &RepoArgs, out: &Path) -> Result<()> {
    let pipeline = AutodeployPipeline::from_config(config)?;
    let (source, repo_url, _) = open_source(pipeline.config(), repo).await?;

    let analysis = pipeline.analyze(source.as_ref(), &repo_url).await?;
    write_report_json(out, &analysis.report)?;

    println!("Repository: {}", repo_url);
    println!(
        "Evidence: {} of {} files, {}/{} bytes ({:?})",
        analysis.corpus.len(),
        analysis.tree_size,
        analysis.corpus.used_bytes(),
        analysis.corpus.budget_cap(),
        analysis.judgment_source
    );
    println!(
        "Language: {}{}",
        analysis.report.language,
        analysis
            .report
            .language_version
            .as_deref()
            .map(|v| format!(" {}", v))
            .unwrap_or_default()
    );
    println!("Port: {}", analysis.report.primary_port());
    println!("Report: {}", out.display());
    Ok(())
}

/// Build a deployment plan from a report
fn cmd_plan(
    config: AutodeployConfig,
    report_path: &Path,
    repo_url: &str,
    overrides: &OverrideArgs,
    out: Option<&Path>,
) -> Result<()> {
    let report = read_report(report_path)?;
    let pipeline = AutodeployPipeline::from_config(config)?;
    let plan = pipeline.plan(repo_url, &report, &build_overrides(overrides)?)?;

    match out {
        Some(path) => {
            write_plan_json(path, &plan)?;
            println!("Plan: {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&plan)?),
    }
    Ok(())
}

/// Render an artifact bundle from a report
fn cmd_render(
    config: AutodeployConfig,
    report_path: &Path,
    repo_url: &str,
    overrides: &OverrideArgs,
    target: TargetDescriptor,
    out: &Path,
) -> Result<()> {
    let report = read_report(report_path)?;
    let pipeline = AutodeployPipeline::from_config(align_cloud(config, target))?;

    let plan = pipeline.plan(repo_url, &report, &build_overrides(overrides)?)?;
    let bootstrap = pipeline.synthesize(&plan, target)?;
    let bundle = pipeline.render(target, &plan, &bootstrap)?;
    let manifest = BundleManifest::new(&plan, &bundle, JudgmentSource::Supplied, "");

    write_bundle(out, &bundle, &report, &plan, &manifest)?;
    print!("{}", render_bundle_summary_md(&manifest, &plan));
    println!("Bundle: {}", out.display());
    Ok(())
}

/// Analyze, plan and render; optionally provision the result
async fn cmd_up(
    config: AutodeployConfig,
    repo: &RepoArgs,
    overrides: &OverrideArgs,
    target: TargetDescriptor,
    out: &Path,
    apply: bool,
    dry_run: bool,
) -> Result<()> {
    let pipeline = AutodeployPipeline::from_config(align_cloud(config, target))?;
    let (source, repo_url, resolved_ref) = open_source(pipeline.config(), repo).await?;

    let mut overrides = build_overrides(overrides)?;
    if overrides.git_ref.is_none() {
        overrides.git_ref = resolved_ref;
    }

    let deployment = pipeline
        .run(source.as_ref(), &repo_url, &overrides, target)
        .await?;
    let manifest = BundleManifest::new(
        &deployment.plan,
        &deployment.bundle,
        deployment.analysis.judgment_source,
        deployment.analysis.corpus.digest(),
    );
    write_bundle(
        out,
        &deployment.bundle,
        &deployment.analysis.report,
        &deployment.plan,
        &manifest,
    )?;
    print!("{}", render_bundle_summary_md(&manifest, &deployment.plan));
    println!("Bundle: {}", out.display());

    if !apply {
        return Ok(());
    }

    let stages = match target {
        TargetDescriptor::VmImage { .. } if dry_run => plan_stages(out),
        TargetDescriptor::VmImage { .. } => apply_stages(out),
        TargetDescriptor::Container => {
            let Some(context) = &repo.local else {
                bail!("--apply for the container target needs --local <dir> as build context");
            };
            let tag = format!("{}:local", deployment.plan.app_name);
            vec![docker_build_stage(&out.join(DOCKERFILE_ARTIFACT), context, &tag)]
        }
        TargetDescriptor::NativeService => {
            bail!("The native target is installed by running startup.sh on the host; nothing to apply")
        }
    };

    run_provisioning(out, stages).await.map(|_| ())
}

/// Print the bootstrap script for a plan, or simulate it
fn cmd_bootstrap(
    config: AutodeployConfig,
    plan_path: &Path,
    target: TargetDescriptor,
    simulate: bool,
    fail: &[BootstrapState],
    unmet: &[BootstrapState],
    json: bool,
) -> Result<()> {
    let plan = read_plan(plan_path)?;
    let pipeline = AutodeployPipeline::from_config(config)?;
    let bootstrap = pipeline.synthesize(&plan, target)?;

    if !simulate {
        print!("{}", bootstrap.script);
        return Ok(());
    }

    let host = fail
        .iter()
        .fold(ScriptedHost::new(), |host, state| host.failing(*state));
    let host = unmet.iter().fold(host, |host, state| host.unmet(*state));
    let trace = bootstrap.machine.simulate(&host);

    if json {
        println!("{}", serde_json::to_string_pretty(&trace)?);
    } else {
        for t in &trace.transitions {
            println!("{} --{:?}--> {}", t.from, t.outcome, t.to);
        }
        println!("Terminal: {}", trace.terminal);
    }

    trace.into_result()?;
    Ok(())
}

/// Destroy infrastructure created from a bundle
async fn cmd_destroy(bundle: &Path) -> Result<()> {
    run_provisioning(bundle, destroy_stages(bundle)).await.map(|_| ())
}

async fn run_provisioning(bundle: &Path, stages: Vec<StageConfig>) -> Result<ProvisionResult> {
    let spec = ProvisionSpec::new(bundle, &stages)?;
    println!();
    println!("Provisioning {} ({})", spec.app_name, spec.run_label());

    let result = ProvisionPipeline::run(&spec, stages)
        .await
        .context("Provisioning failed to run")?;
    result.write_record(bundle)?;

    for stage in &result.stages {
        let status = if stage.passed() { "✓" } else { "✗" };
        println!(
            "  {} {} ({}ms, exit code: {})",
            status, stage.stage_name, stage.duration_ms, stage.exit_code
        );
    }
    if let Some(gate) = &result.gate {
        if !gate.passed {
            println!("Gate: ✗ FAILED");
            for violation in &gate.violations {
                println!("  - {}", violation);
            }
        }
    }

    if let Some(summary) = result.failure_summary() {
        bail!("Provisioning failed: {}", summary);
    }
    if let Some(url) = &result.app_url {
        println!("\n✓ Application URL: {}", url);
    } else {
        println!("\n✓ All stages passed");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodeploy_core::bundle::MANIFEST_FILE;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn sample_checkout() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "# demo\nRun `python app.py`.\n").unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "flask==3.0.0\n").unwrap();
        std::fs::write(
            dir.path().join("app.py"),
            "import os\nPORT = int(os.environ.get('PORT', 5000))\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_overrides_are_parsed() {
        let cli = parse(&[
            "autodeploy",
            "plan",
            "--repo-url",
            "https://github.com/acme/demo",
            "--port",
            "9000",
            "--env",
            "DEBUG=1",
            "--env",
            "NAME=a=b",
            "--image",
            "ghcr.io/acme/demo:latest",
        ]);
        let Commands::Plan { overrides, .. } = cli.command else {
            panic!("expected plan");
        };
        let parsed = build_overrides(&overrides).unwrap();
        assert_eq!(parsed.port, Some(9000));
        assert_eq!(parsed.env[1].key, "NAME");
        assert_eq!(parsed.env[1].value, "a=b");
        assert_eq!(parsed.image_reference.as_deref(), Some("ghcr.io/acme/demo:latest"));
    }

    #[test]
    fn test_bad_env_override_is_rejected() {
        let args = OverrideArgs {
            env: vec!["not-an-assignment".to_string()],
            ..Default::default()
        };
        assert!(build_overrides(&args).is_err());
    }

    #[test]
    fn test_repo_or_local_is_required() {
        assert!(Cli::try_parse_from(["autodeploy", "analyze"]).is_err());
        assert!(Cli::try_parse_from(["autodeploy", "analyze", "--local", "."]).is_ok());
        assert!(Cli::try_parse_from([
            "autodeploy",
            "analyze",
            "https://github.com/acme/demo",
            "--local",
            "."
        ])
        .is_err());
    }

    #[test]
    fn test_simulation_flags_parse_states() {
        let cli = parse(&[
            "autodeploy",
            "bootstrap",
            "--simulate",
            "--fail",
            "clone_source",
            "--unmet",
            "NATIVE_RUN_PYTHON",
        ]);
        let Commands::Bootstrap { fail, unmet, .. } = cli.command else {
            panic!("expected bootstrap");
        };
        assert_eq!(fail, vec![BootstrapState::CloneSource]);
        assert_eq!(unmet[0].id(), "NATIVE_RUN_PYTHON");
        assert!(Cli::try_parse_from(["autodeploy", "bootstrap", "--fail", "CLONE_SOURCE"]).is_err());
    }

    #[test]
    fn test_settings_override_config() {
        let cli = parse(&[
            "autodeploy",
            "--cloud",
            "aws",
            "--region",
            "eu-west-1",
            "destroy",
        ]);
        let config = apply_settings(AutodeployConfig::default(), &cli.settings);
        assert_eq!(config.provision.cloud, CloudProvider::Aws);
        assert_eq!(config.provision.region, "eu-west-1");
    }

    #[test]
    fn test_vm_target_sets_cloud() {
        let config = align_cloud(
            AutodeployConfig::default(),
            "vm-aws".parse::<TargetDescriptor>().unwrap(),
        );
        assert_eq!(config.provision.cloud, CloudProvider::Aws);
        let config = align_cloud(AutodeployConfig::default(), TargetDescriptor::Container);
        assert_eq!(config.provision.cloud, CloudProvider::Gcp);
    }

    #[tokio::test]
    async fn test_analyze_then_render_local_checkout() {
        let checkout = sample_checkout();
        let work = tempfile::tempdir().unwrap();
        let report_path = work.path().join(REPORT_FILE);

        let repo = RepoArgs {
            local: Some(checkout.path().to_path_buf()),
            repo_url: Some("https://github.com/acme/demo.git".to_string()),
            ..Default::default()
        };
        cmd_analyze(AutodeployConfig::default(), &repo, &report_path)
            .await
            .unwrap();
        let report = read_report(&report_path).unwrap();
        assert_eq!(report.language, "python");

        let out = work.path().join("bundle");
        cmd_render(
            AutodeployConfig::default(),
            &report_path,
            "https://github.com/acme/demo.git",
            &OverrideArgs::default(),
            TargetDescriptor::VmImage {
                provider: CloudProvider::Gcp,
            },
            &out,
        )
        .unwrap();

        for name in [MANIFEST_FILE, PLAN_FILE, REPORT_FILE, "main.tf", "startup.sh"] {
            assert!(out.join(name).is_file(), "{} missing", name);
        }
        let manifest: BundleManifest =
            serde_json::from_str(&std::fs::read_to_string(out.join(MANIFEST_FILE)).unwrap())
                .unwrap();
        assert_eq!(manifest.judgment_source, JudgmentSource::Supplied);
        assert_eq!(manifest.target, "vm-gcp");
    }

    #[tokio::test]
    async fn test_up_without_apply_writes_bundle() {
        let checkout = sample_checkout();
        let work = tempfile::tempdir().unwrap();
        let out = work.path().join("bundle");
        let repo = RepoArgs {
            local: Some(checkout.path().to_path_buf()),
            repo_url: Some("https://github.com/acme/demo.git".to_string()),
            ..Default::default()
        };

        cmd_up(
            AutodeployConfig::default(),
            &repo,
            &OverrideArgs {
                port: Some(5000),
                ..Default::default()
            },
            TargetDescriptor::Container,
            &out,
            false,
            false,
        )
        .await
        .unwrap();

        let plan = read_plan(&out.join(PLAN_FILE)).unwrap();
        assert_eq!(plan.app_port, 5000);
        assert!(out.join(DOCKERFILE_ARTIFACT).is_file());
    }

    #[test]
    fn test_bootstrap_simulation_reports_exhaustion() {
        let work = tempfile::tempdir().unwrap();
        let plan_path = work.path().join(PLAN_FILE);
        let report = EnvironmentReport {
            language: "python".to_string(),
            ..Default::default()
        };
        let pipeline = AutodeployPipeline::from_config(AutodeployConfig::default()).unwrap();
        let plan = pipeline
            .plan("https://github.com/acme/demo.git", &report, &PlanOverrides::default())
            .unwrap();
        write_plan_json(&plan_path, &plan).unwrap();

        let target = TargetDescriptor::VmImage {
            provider: CloudProvider::Gcp,
        };
        cmd_bootstrap(
            AutodeployConfig::default(),
            &plan_path,
            target,
            true,
            &[],
            &[],
            false,
        )
        .unwrap();

        let err = cmd_bootstrap(
            AutodeployConfig::default(),
            &plan_path,
            target,
            true,
            &[BootstrapState::CloneSource],
            &[],
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("CLONE_SOURCE"));
    }

    #[test]
    fn test_invalid_report_is_refused() {
        let work = tempfile::tempdir().unwrap();
        let path = work.path().join(REPORT_FILE);
        let report = EnvironmentReport {
            ports: vec![],
            ..Default::default()
        };
        write_report_json(&path, &report).unwrap();
        let err = read_report(&path).unwrap_err();
        assert!(err.to_string().contains("not a valid environment report"));
    }
}
