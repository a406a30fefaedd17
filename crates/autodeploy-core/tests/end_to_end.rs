//! Repository evidence to rendered bundle, with a scripted oracle.

use std::sync::Arc;

use autodeploy_core::oracle::{PromptPurpose, StubOracle};
use autodeploy_core::render::TargetDescriptor;
use autodeploy_core::{
    AutodeployConfig, AutodeployPipeline, CloudProvider, JudgmentOracle, JudgmentSource,
    PlanOverrides,
};
use repo_evidence::fakes::MemorySource;
use repo_evidence::{CorpusBudget, CorpusOutcome};

const README: &str = "# Demo\n\nA tiny flask service.\n";
const REQUIREMENTS: &str = "flask==3.0.0\ngunicorn==21.2.0\n";
const PROCFILE: &str = "web: gunicorn -b 0.0.0.0:8000 app:app\n";
const LOCK_TAIL: usize = 50;

fn repository() -> MemorySource {
    MemorySource::new()
        .with_file("README.md", README)
        .with_file("requirements.txt", REQUIREMENTS)
        .with_file("Procfile", PROCFILE)
        .with_file("poetry.lock", "# resolved package entry\n".repeat(200))
        .with_file("app.py", "from flask import Flask\napp = Flask(__name__)\n")
}

fn config() -> AutodeployConfig {
    let mut config = AutodeployConfig::default();
    config.budget = CorpusBudget {
        max_files: 16,
        per_file_bytes: 100_000,
        total_bytes: README.len() + REQUIREMENTS.len() + PROCFILE.len() + LOCK_TAIL,
    };
    config
}

fn pipeline(oracle: StubOracle) -> AutodeployPipeline {
    AutodeployPipeline::new(config(), Arc::new(oracle) as Arc<dyn JudgmentOracle>)
}

#[tokio::test]
async fn python_repository_end_to_end() {
    // Path selection answers; the report request fails and the heuristic
    // scan takes over.
    let oracle = StubOracle::new().answering(
        PromptPurpose::PathSelection,
        r#"Here you go: ["requirements.txt", "Procfile", "poetry.lock", "app.py"]"#,
    );
    let pipeline = pipeline(oracle);
    let deployment = pipeline
        .run(
            &repository(),
            "https://github.com/acme/flask-demo",
            &PlanOverrides::default(),
            TargetDescriptor::VmImage {
                provider: CloudProvider::Gcp,
            },
        )
        .await
        .unwrap();

    let corpus = &deployment.analysis.corpus;
    assert_eq!(
        corpus.paths(),
        ["README.md", "requirements.txt", "Procfile", "poetry.lock"]
    );
    assert!(!corpus.get("README.md").unwrap().is_truncated());
    assert_eq!(corpus.get("README.md").unwrap().content(), README);
    assert!(corpus.get("poetry.lock").unwrap().is_truncated());
    assert!(corpus.get("app.py").is_none());
    assert!(corpus.used_bytes() <= corpus.budget_cap());
    assert!(matches!(
        corpus.outcome(),
        CorpusOutcome::BudgetExhausted { truncated_path: Some(p), .. } if p == "poetry.lock"
    ));

    let report = &deployment.analysis.report;
    assert_eq!(deployment.analysis.judgment_source, JudgmentSource::Heuristic);
    assert_eq!(report.language, "python");
    assert_eq!(report.ports, vec![8000]);
    assert!(report.frameworks.contains("flask"));
    assert_eq!(report.start_commands[0], "gunicorn -b 0.0.0.0:8000 app:app");

    let plan = &deployment.plan;
    assert_eq!(plan.app_port, 8000);
    assert_eq!(plan.env_value("PORT"), Some("8000"));
    assert_eq!(plan.env_value("HOST"), Some("0.0.0.0"));
    assert_eq!(plan.repo_url, "https://github.com/acme/flask-demo.git");

    let script = &deployment.bootstrap.script;
    assert!(script.contains("APP_PORT=8000\n"));
    assert!(script.contains("PORT=8000\nHOST=0.0.0.0\nAUTODEPLOY_ENV_EOF\n"));
    assert!(script.contains("START_COMMAND='gunicorn -b 0.0.0.0:8000 app:app'\n"));
    assert_eq!(
        deployment.bundle.get("startup.sh").unwrap().content,
        *script
    );
    let tfvars: serde_json::Value = serde_json::from_str(
        &deployment.bundle.get("terraform.tfvars.json").unwrap().content,
    )
    .unwrap();
    assert_eq!(tfvars["app_port"], 8000);

    let container = pipeline
        .render(TargetDescriptor::Container, plan, &deployment.bootstrap)
        .unwrap();
    let dockerfile = &container.get("Dockerfile").unwrap().content;
    assert!(dockerfile.starts_with("FROM python:3.11-slim\n"));
    assert!(dockerfile.contains("ENV PORT=\"8000\" HOST=\"0.0.0.0\"\n"));
    assert!(dockerfile.contains("EXPOSE 8000\n"));
    assert!(dockerfile.contains("gunicorn -b 0.0.0.0:8000 app:app"));
}

#[tokio::test]
async fn oracle_report_prefers_conventional_port() {
    let oracle = StubOracle::new()
        .answering(PromptPurpose::PathSelection, "[\"requirements.txt\"]")
        .answering(
            PromptPurpose::EnvironmentReport,
            r#"Sure! ```json
{"language": "Python", "ports": ["3000", 8080, 22], "env_vars": [
  {"name": "DATABASE_URL", "required": true},
  {"name": "database_url", "required": false},
  {"name": "LOG_LEVEL", "default": "info"}
], "start_commands": []}
``` Let me know if you need more."#,
        );
    let pipeline = pipeline(oracle);
    let analysis = pipeline
        .analyze(&repository(), "https://github.com/acme/flask-demo")
        .await
        .unwrap();

    assert_eq!(analysis.judgment_source, JudgmentSource::Oracle);
    assert_eq!(analysis.report.language, "python");
    assert_eq!(analysis.report.ports, vec![8080, 3000, 22]);
    assert_eq!(analysis.report.env_vars.len(), 2);

    let plan = pipeline
        .plan(&analysis.repo_url, &analysis.report, &PlanOverrides::default())
        .unwrap();
    assert_eq!(plan.app_port, 8080);
    assert_eq!(plan.start_command, "python app.py");
    let keys: Vec<&str> = plan.env_lines.iter().map(|l| l.key.as_str()).collect();
    assert_eq!(keys, ["LOG_LEVEL", "PORT", "HOST"]);
}

#[tokio::test]
async fn identical_runs_render_identical_artifacts() {
    let make = || {
        StubOracle::new().answering(
            PromptPurpose::PathSelection,
            r#"["requirements.txt", "Procfile", "poetry.lock"]"#,
        )
    };
    let target = TargetDescriptor::NativeService;
    let first = pipeline(make())
        .run(&repository(), "https://github.com/acme/flask-demo", &PlanOverrides::default(), target)
        .await
        .unwrap();
    let second = pipeline(make())
        .run(&repository(), "https://github.com/acme/flask-demo", &PlanOverrides::default(), target)
        .await
        .unwrap();

    assert_eq!(first.analysis.corpus.digest(), second.analysis.corpus.digest());
    assert_eq!(first.plan, second.plan);
    assert_eq!(first.bundle, second.bundle);
}
