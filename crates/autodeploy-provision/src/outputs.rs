//! Terraform output parsing.

use std::collections::BTreeMap;

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct OutputEntry {
    value: Value,
}

/// Parse `terraform output -json` into name → value.
pub fn parse_terraform_outputs(stdout: &str) -> anyhow::Result<BTreeMap<String, Value>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(BTreeMap::new());
    }
    let raw: BTreeMap<String, OutputEntry> =
        serde_json::from_str(trimmed).context("parse terraform output")?;
    Ok(raw.into_iter().map(|(k, v)| (k, v.value)).collect())
}

/// The reachable URL: `app_url` when the template exports it, otherwise
/// built from `public_ip` and the application port.
pub fn derive_app_url(outputs: &BTreeMap<String, Value>, app_port: Option<u16>) -> Option<String> {
    if let Some(url) = outputs.get("app_url").and_then(Value::as_str) {
        if !url.is_empty() {
            return Some(url.to_string());
        }
    }
    let ip = outputs.get("public_ip").and_then(Value::as_str)?;
    if ip.is_empty() {
        return None;
    }
    Some(match app_port {
        Some(port) => format!("http://{}:{}", ip, port),
        None => format!("http://{}", ip),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_values_and_ignores_metadata() {
        let out = parse_terraform_outputs(
            r#"{"public_ip":{"sensitive":false,"type":"string","value":"203.0.113.7"},
                "app_url":{"sensitive":false,"type":"string","value":"http://203.0.113.7:8000"}}"#,
        )
        .unwrap();
        assert_eq!(out["public_ip"], "203.0.113.7");
        assert_eq!(
            derive_app_url(&out, Some(9999)).as_deref(),
            Some("http://203.0.113.7:8000")
        );
    }

    #[test]
    fn falls_back_to_public_ip() {
        let out = parse_terraform_outputs(r#"{"public_ip":{"value":"198.51.100.2"}}"#).unwrap();
        assert_eq!(
            derive_app_url(&out, Some(3000)).as_deref(),
            Some("http://198.51.100.2:3000")
        );
        assert_eq!(derive_app_url(&out, None).as_deref(), Some("http://198.51.100.2"));
    }

    #[test]
    fn empty_output_has_no_url() {
        let out = parse_terraform_outputs("\n").unwrap();
        assert!(out.is_empty());
        assert_eq!(derive_app_url(&out, Some(80)), None);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_terraform_outputs("Error: no state").is_err());
    }
}
