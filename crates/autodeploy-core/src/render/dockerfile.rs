//! Container build descriptor rendering.

use super::escape::{dockerfile_value, exec_form};
use crate::domain::{DeploymentPlan, Result, RuntimeFamily};

pub const DOCKERFILE_ARTIFACT: &str = "Dockerfile";
pub const DOCKERIGNORE_ARTIFACT: &str = ".dockerignore";

const DEFAULT_PYTHON: &str = "3.11";
const DEFAULT_NODE: u32 = 18;
const NODE_IMAGES: &[u32] = &[14, 16, 18, 20, 22];
const FALLBACK_BASE: &str = "debian:stable-slim";

const DOCKERIGNORE: &str = ".git\n.venv\nvenv\nnode_modules\n__pycache__\n*.pyc\n.env\ntarget\n";

fn leading_numbers(version: &str) -> Vec<u32> {
    version
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .split('.')
        .map_while(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        })
        .collect()
}

/// `python:X.Y-slim`; versions older than 3.10 are raised to 3.10.
fn python_image(version: Option<&str>) -> String {
    let tag = match version.map(leading_numbers).as_deref() {
        Some([3, minor, ..]) if *minor < 10 => "3.10".to_string(),
        Some([3, minor, ..]) if *minor <= 13 => format!("3.{}", minor),
        _ => DEFAULT_PYTHON.to_string(),
    };
    format!("python:{}-slim", tag)
}

fn node_image(version: Option<&str>) -> String {
    let major = version
        .map(leading_numbers)
        .and_then(|v| v.first().copied())
        .filter(|m| NODE_IMAGES.contains(m))
        .unwrap_or(DEFAULT_NODE);
    format!("node:{}-alpine", major)
}

/// Base image for the plan's runtime.
pub fn base_image(plan: &DeploymentPlan) -> String {
    let version = plan.language_version.as_deref();
    match plan.runtime() {
        Some(RuntimeFamily::Python) => python_image(version),
        Some(RuntimeFamily::Node) => node_image(version),
        _ => FALLBACK_BASE.to_string(),
    }
}

fn install_steps(runtime: Option<RuntimeFamily>) -> &'static str {
    match runtime {
        Some(RuntimeFamily::Python) => {
            "COPY . .\nRUN if [ -f requirements.txt ]; then pip install --no-cache-dir -r requirements.txt; \\\n    elif [ -f pyproject.toml ] || [ -f setup.py ]; then pip install --no-cache-dir .; fi\n"
        }
        Some(RuntimeFamily::Node) => {
            "COPY package*.json ./\nRUN npm ci --omit=dev || npm install --omit=dev\nCOPY . .\n"
        }
        Some(RuntimeFamily::Go) => {
            "RUN apt-get update && apt-get install -y --no-install-recommends golang-go ca-certificates && rm -rf /var/lib/apt/lists/*\nCOPY . .\nRUN go mod download || true\n"
        }
        Some(RuntimeFamily::Ruby) => {
            "RUN apt-get update && apt-get install -y --no-install-recommends ruby-full build-essential && rm -rf /var/lib/apt/lists/*\nCOPY . .\nRUN gem install bundler && (bundle install || true)\n"
        }
        _ => "COPY . .\n",
    }
}

/// Render the Dockerfile. Only `PORT` and `HOST` are baked in; the rest of
/// the environment is supplied at run time from the env file.
pub fn render_dockerfile(plan: &DeploymentPlan) -> Result<String> {
    let port = plan.app_port.to_string();
    let host = plan.env_value("HOST").unwrap_or(crate::planner::DEFAULT_HOST);

    let mut out = String::new();
    out.push_str(&format!("FROM {}\n", base_image(plan)));
    out.push_str("WORKDIR /app\n");
    out.push_str(install_steps(plan.runtime()));
    out.push_str(&format!(
        "ENV PORT={} HOST={}\n",
        dockerfile_value(DOCKERFILE_ARTIFACT, "app_port", &port)?,
        dockerfile_value(DOCKERFILE_ARTIFACT, "env_lines.HOST", host)?
    ));
    out.push_str(&format!("EXPOSE {}\n", plan.app_port));
    out.push_str(&format!(
        "CMD {}\n",
        exec_form(
            DOCKERFILE_ARTIFACT,
            "start_command",
            &["/bin/sh", "-c", &plan.start_command]
        )?
    ));
    Ok(out)
}

pub fn render_dockerignore() -> String {
    DOCKERIGNORE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CloudProvider, EnvLine, SizeTier, Strategy};

    fn plan(language: &str, version: Option<&str>) -> DeploymentPlan {
        DeploymentPlan {
            app_name: "autodeploy-demo-abc123".into(),
            repo_url: "https://github.com/acme/demo.git".into(),
            git_ref: None,
            language: language.into(),
            language_version: version.map(str::to_string),
            app_port: 8000,
            start_command: "gunicorn -b 0.0.0.0:$PORT \"app:app\"".into(),
            env_lines: vec![EnvLine::new("PORT", "8000"), EnvLine::new("HOST", "0.0.0.0")],
            cloud: CloudProvider::Gcp,
            size_tier: SizeTier::Small,
            machine_class: "e2-small".into(),
            disk_size_gb: 30,
            image_reference: None,
            strategy_order: vec![Strategy::LocalImage, Strategy::Native],
        }
    }

    #[test]
    fn base_image_follows_version() {
        assert_eq!(base_image(&plan("python", Some("3.8"))), "python:3.10-slim");
        assert_eq!(base_image(&plan("python", Some(">=3.12"))), "python:3.12-slim");
        assert_eq!(base_image(&plan("python", None)), "python:3.11-slim");
        assert_eq!(base_image(&plan("node", Some("v20.11.0"))), "node:20-alpine");
        assert_eq!(base_image(&plan("node", Some("17"))), "node:18-alpine");
        assert_eq!(base_image(&plan("go", Some("1.22"))), "debian:stable-slim");
    }

    #[test]
    fn dockerfile_carries_port_host_and_command() {
        let text = render_dockerfile(&plan("python", Some("3.11"))).unwrap();
        assert!(text.starts_with("FROM python:3.11-slim\nWORKDIR /app\n"));
        assert!(text.contains("pip install --no-cache-dir -r requirements.txt"));
        assert!(text.contains("ENV PORT=\"8000\" HOST=\"0.0.0.0\"\n"));
        assert!(text.contains("EXPOSE 8000\n"));
        assert!(text.contains(r#"CMD ["/bin/sh","-c","gunicorn -b 0.0.0.0:$PORT \"app:app\""]"#));
    }

    #[test]
    fn host_with_dollar_is_not_expanded() {
        let mut p = plan("node", None);
        p.env_lines[1].value = "$(hostname)".into();
        let text = render_dockerfile(&p).unwrap();
        assert!(text.contains("HOST=\"\\$(hostname)\""));
    }
}
