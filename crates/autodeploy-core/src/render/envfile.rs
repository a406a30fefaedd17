//! Environment file rendering: one `KEY=VALUE` line per plan env line.

use super::escape::{env_file_line, verbatim_env_value};
use crate::domain::{DeploymentPlan, Result, Strategy};

pub const ENV_FILE_ARTIFACT: &str = "app.env";

/// Program that parses the environment file.
///
/// `docker run --env-file` takes everything after `=` verbatim, while
/// systemd's `EnvironmentFile=` strips quotes and processes backslashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvFileReader {
    Docker,
    Systemd,
}

impl EnvFileReader {
    /// Strictest reader among the plan's strategies. The native fallback
    /// hands the same file to systemd.
    pub fn for_plan(plan: &DeploymentPlan) -> Self {
        if plan.uses(Strategy::Native) {
            Self::Systemd
        } else {
            Self::Docker
        }
    }
}

pub fn render_env_file(plan: &DeploymentPlan, reader: EnvFileReader) -> Result<String> {
    let mut out = String::new();
    for (i, line) in plan.env_lines.iter().enumerate() {
        let rendered = env_file_line(ENV_FILE_ARTIFACT, i, line)?;
        if reader == EnvFileReader::Systemd {
            verbatim_env_value(ENV_FILE_ARTIFACT, &format!("env_lines[{}]", i), &line.value)?;
        }
        out.push_str(&rendered);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AutodeployError, CloudProvider, EnvLine, SizeTier};

    fn plan(strategies: Vec<Strategy>, value: &str) -> DeploymentPlan {
        DeploymentPlan {
            app_name: "autodeploy-demo-abc123".into(),
            repo_url: "https://github.com/acme/demo.git".into(),
            git_ref: None,
            language: "python".into(),
            language_version: None,
            app_port: 8000,
            start_command: "python app.py".into(),
            env_lines: vec![EnvLine::new("PORT", "8000"), EnvLine::new("GREETING", value)],
            cloud: CloudProvider::Gcp,
            size_tier: SizeTier::Micro,
            machine_class: "e2-micro".into(),
            disk_size_gb: 20,
            image_reference: None,
            strategy_order: strategies,
        }
    }

    #[test]
    fn docker_reader_keeps_quotes_verbatim() {
        let plan = plan(vec![Strategy::LocalImage], r#"say "hi" \o/"#);
        let text = render_env_file(&plan, EnvFileReader::Docker).unwrap();
        assert_eq!(text, "PORT=8000\nGREETING=say \"hi\" \\o/\n");
    }

    #[test]
    fn systemd_reader_refuses_quoting_characters() {
        for value in [r#"say "hi""#, "it's", r"C:\temp"] {
            let plan = plan(vec![Strategy::LocalImage, Strategy::Native], value);
            assert_eq!(EnvFileReader::for_plan(&plan), EnvFileReader::Systemd);
            let err = render_env_file(&plan, EnvFileReader::Systemd).unwrap_err();
            assert!(matches!(err, AutodeployError::RenderEscape { .. }), "{:?}", value);
            assert!(err.to_string().contains("env_lines[1]"));
        }
    }

    #[test]
    fn plain_values_render_for_both_readers() {
        let plan = plan(vec![Strategy::LocalImage, Strategy::Native], "a=b c");
        let docker = render_env_file(&plan, EnvFileReader::Docker).unwrap();
        let systemd = render_env_file(&plan, EnvFileReader::Systemd).unwrap();
        assert_eq!(docker, systemd);
    }
}
