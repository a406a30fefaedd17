//! Target-syntax escaping.
//!
//! Every plan value substituted into an artifact goes through one of these
//! functions first. Each knows the quoting and interpolation rules of its
//! target format; a value that cannot be made safe becomes a
//! [`AutodeployError::RenderEscape`] naming the artifact and the field.

use std::borrow::Cow;

use crate::domain::{AutodeployError, EnvLine, Result};

fn reject_nul(artifact: &str, field: &str, value: &str) -> Result<()> {
    if value.contains('\0') {
        return Err(AutodeployError::render(artifact, field, "value contains a NUL byte"));
    }
    Ok(())
}

fn reject_line_breaks(artifact: &str, field: &str, value: &str) -> Result<()> {
    reject_nul(artifact, field, value)?;
    if value.contains(['\n', '\r']) {
        return Err(AutodeployError::render(artifact, field, "value contains a line break"));
    }
    Ok(())
}

/// Single POSIX shell word.
pub fn shell_word(artifact: &str, field: &str, value: &str) -> Result<String> {
    reject_nul(artifact, field, value)?;
    Ok(shell_escape::unix::escape(Cow::Borrowed(value)).into_owned())
}

/// Double-quoted HCL string literal with template sequences neutralised.
pub fn hcl_string(artifact: &str, field: &str, value: &str) -> Result<String> {
    reject_nul(artifact, field, value)?;
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('"');
    Ok(out)
}

/// Double-quoted systemd unit argument. `%` specifiers and `$` variable
/// references are doubled so they reach the process literally.
pub fn systemd_arg(artifact: &str, field: &str, value: &str) -> Result<String> {
    reject_line_breaks(artifact, field, value)?;
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '%' => out.push_str("%%"),
            '$' => out.push_str("$$"),
            other => out.push(other),
        }
    }
    out.push('"');
    Ok(out)
}

/// Double-quoted Dockerfile `ENV` value with variable substitution disabled.
pub fn dockerfile_value(artifact: &str, field: &str, value: &str) -> Result<String> {
    reject_line_breaks(artifact, field, value)?;
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' | '"' | '$' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('"');
    Ok(out)
}

/// JSON exec-form argument vector for Dockerfile `CMD`/`ENTRYPOINT`.
pub fn exec_form(artifact: &str, field: &str, argv: &[&str]) -> Result<String> {
    for arg in argv {
        reject_nul(artifact, field, arg)?;
    }
    Ok(serde_json::to_string(argv)?)
}

/// Whether `key` is a portable environment variable name.
pub fn is_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One `KEY=VALUE` line of an environment file.
pub fn env_file_line(artifact: &str, index: usize, line: &EnvLine) -> Result<String> {
    let field = format!("env_lines[{}]", index);
    if !is_env_key(&line.key) {
        return Err(AutodeployError::render(
            artifact,
            &field,
            format!("{:?} is not a valid variable name", line.key),
        ));
    }
    reject_line_breaks(artifact, &field, &line.value)?;
    Ok(format!("{}={}", line.key, line.value))
}

/// Refuse env values whose meaning depends on the env file parser.
pub fn verbatim_env_value(artifact: &str, field: &str, value: &str) -> Result<()> {
    if let Some(c) = value.chars().find(|c| matches!(c, '"' | '\'' | '\\')) {
        return Err(AutodeployError::render(
            artifact,
            field,
            format!("value contains {:?}, which systemd would unquote", c),
        ));
    }
    Ok(())
}

/// Check a heredoc body cannot terminate early.
pub fn heredoc_body(artifact: &str, field: &str, body: &str, delimiter: &str) -> Result<()> {
    reject_nul(artifact, field, body)?;
    if body.lines().any(|l| l == delimiter) {
        return Err(AutodeployError::render(
            artifact,
            field,
            format!("body contains the heredoc delimiter {}", delimiter),
        ));
    }
    Ok(())
}
