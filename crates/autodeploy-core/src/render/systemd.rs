//! Supervised service unit rendering.

use super::escape::systemd_arg;
use crate::domain::{AutodeployError, Result};

const BASE_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Inputs for one service unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUnit<'a> {
    pub app_name: &'a str,
    pub working_dir: &'a str,
    pub env_file: &'a str,
    pub command: &'a str,
    /// Prepended to `PATH`, e.g. a virtualenv `bin` directory.
    pub path_prefix: Option<&'a str>,
}

/// Unit file name for an application identity.
pub fn unit_name(app_name: &str) -> String {
    format!("{}.service", app_name)
}

fn unit_path(artifact: &str, field: &str, value: &str) -> Result<String> {
    if !value.starts_with('/') || value.contains(['\n', '\r', '\0', ' ']) {
        return Err(AutodeployError::render(
            artifact,
            field,
            format!("{:?} is not a plain absolute path", value),
        ));
    }
    Ok(value.replace('%', "%%"))
}

/// Render a `Restart=always` unit running `command` through `/bin/sh -c`.
pub fn render_unit(unit: &ServiceUnit<'_>) -> Result<String> {
    let artifact = unit_name(unit.app_name);
    let working_dir = unit_path(&artifact, "app_dir", unit.working_dir)?;
    let env_file = unit_path(&artifact, "env_file", unit.env_file)?;
    let path = match unit.path_prefix {
        Some(prefix) => format!("PATH={}:{}", prefix, BASE_PATH),
        None => format!("PATH={}", BASE_PATH),
    };

    let mut out = String::new();
    out.push_str("[Unit]\n");
    out.push_str(&format!("Description=autodeploy {}\n", unit.app_name));
    out.push_str("After=network-online.target\nWants=network-online.target\n\n");
    out.push_str("[Service]\nType=simple\n");
    out.push_str(&format!("WorkingDirectory={}\n", working_dir));
    out.push_str(&format!("EnvironmentFile={}\n", env_file));
    out.push_str(&format!(
        "Environment={}\n",
        systemd_arg(&artifact, "path", &path)?
    ));
    out.push_str("Environment=\"HOME=/root\"\n");
    out.push_str(&format!(
        "ExecStart=/bin/sh -c {}\n",
        systemd_arg(&artifact, "start_command", unit.command)?
    ));
    out.push_str("Restart=always\nRestartSec=3\n\n");
    out.push_str("[Install]\nWantedBy=multi-user.target\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit<'a>(command: &'a str, dir: &'a str) -> ServiceUnit<'a> {
        ServiceUnit {
            app_name: "autodeploy-demo-abc123",
            working_dir: dir,
            env_file: "/etc/autodeploy/autodeploy-demo-abc123.env",
            command,
            path_prefix: Some("/opt/app/.venv/bin"),
        }
    }

    #[test]
    fn unit_restarts_and_reads_env_file() {
        let text = render_unit(&unit("gunicorn -b 0.0.0.0:$PORT app:app", "/opt/app")).unwrap();
        assert!(text.contains("Restart=always\n"));
        assert!(text.contains("EnvironmentFile=/etc/autodeploy/autodeploy-demo-abc123.env\n"));
        assert!(text.contains("Environment=\"PATH=/opt/app/.venv/bin:/usr/local/sbin"));
        assert!(text.contains("ExecStart=/bin/sh -c \"gunicorn -b 0.0.0.0:$$PORT app:app\"\n"));
        assert!(text.contains("WantedBy=multi-user.target"));
    }

    #[test]
    fn relative_or_spaced_dirs_are_rejected() {
        assert!(render_unit(&unit("x", "opt/app")).is_err());
        assert!(render_unit(&unit("x", "/opt/my app")).is_err());
        assert!(render_unit(&unit("a\nb", "/opt/app")).is_err());
    }
}
