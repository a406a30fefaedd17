//! Config normalization
//!
//! Turns an untrusted judgment (oracle text, or the heuristic fallback) into
//! a canonical [`EnvironmentReport`]. Every field is coerced independently and
//! the output satisfies the report invariants no matter how malformed the
//! input was. Nothing in this module returns an error to the caller.

pub mod extract;
pub mod heuristic;

use std::collections::{BTreeSet, HashSet};

use repo_evidence::EvidenceCorpus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{
    AutodeployError, Dependency, EnvVar, EnvironmentReport, Result, DEFAULT_LANGUAGE,
    DEFAULT_PORT, PREFERRED_PORTS,
};
use crate::render::escape::is_env_key;

pub use extract::{first_json_array, first_json_object};
pub use heuristic::HeuristicJudgment;

/// Where the normalized report came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JudgmentSource {
    Oracle,
    Heuristic,
    Defaults,
    /// Read from an existing `env_report.json` rather than inferred.
    Supplied,
}

/// A normalized report together with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub report: EnvironmentReport,
    pub source: JudgmentSource,
}

/// Converts raw judgments into canonical reports.
pub struct ConfigNormalizer;

impl ConfigNormalizer {
    /// Extract the judgment object from raw oracle text.
    pub fn parse_judgment(text: &str) -> Result<Map<String, Value>> {
        if text.trim().is_empty() {
            return Err(AutodeployError::JudgmentParse("empty judgment".to_string()));
        }
        first_json_object(text).ok_or_else(|| {
            AutodeployError::JudgmentParse("no balanced JSON object in judgment".to_string())
        })
    }

    /// Normalize the oracle's judgment, falling back to the heuristic scan of
    /// `corpus` when there is no judgment or it does not parse.
    pub fn normalize(raw: Option<&str>, corpus: &EvidenceCorpus) -> Normalized {
        let heuristic = heuristic::extract(corpus);

        let parsed = raw.map(Self::parse_judgment);
        match parsed {
            Some(Ok(obj)) => {
                let mut report = Self::normalize_object(&obj);
                if report.env_vars.is_empty() {
                    let seeded = env_vars(heuristic.object.get("env_vars"), &mut Vec::new());
                    if !seeded.is_empty() {
                        debug!(count = seeded.len(), "seeding env vars from evidence scan");
                        report.env_vars = seeded;
                        report
                            .notes
                            .push("env vars seeded from evidence scan".to_string());
                    }
                }
                Normalized {
                    report,
                    source: JudgmentSource::Oracle,
                }
            }
            other => {
                let reason = match other {
                    Some(Err(e)) => e.to_string(),
                    _ => "no oracle judgment".to_string(),
                };
                warn!(%reason, "falling back to heuristic extraction");
                let mut report = Self::normalize_object(&heuristic.object);
                report
                    .notes
                    .push(format!("oracle judgment unusable ({})", reason));
                let source = if heuristic.found_anything {
                    JudgmentSource::Heuristic
                } else {
                    JudgmentSource::Defaults
                };
                Normalized { report, source }
            }
        }
    }

    /// Apply every normalization rule to a judgment object.
    pub fn normalize_object(obj: &Map<String, Value>) -> EnvironmentReport {
        let mut notes = texts(field(obj, &["notes", "note"]), false);

        let language = field(obj, &["language", "lang", "runtime"])
            .and_then(text)
            .map(|l| l.to_lowercase())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let language_version = field(
            obj,
            &[
                "language_version",
                "languageVersion",
                "runtime_version",
                "runtimeVersion",
                "version",
            ],
        )
        .and_then(text);

        let frameworks: BTreeSet<String> = texts(field(obj, &["frameworks", "framework"]), true)
            .into_iter()
            .collect();

        let package_manager =
            field(obj, &["package_manager", "packageManager"]).and_then(text);

        let env_vars = env_vars(
            field(
                obj,
                &[
                    "env_vars",
                    "envVars",
                    "environment_variables",
                    "environmentVariables",
                    "env",
                ],
            ),
            &mut notes,
        );

        EnvironmentReport {
            language,
            language_version,
            frameworks,
            package_manager,
            dependencies: dependencies(field(obj, &["dependencies", "deps"])),
            dev_dependencies: dependencies(field(obj, &["dev_dependencies", "devDependencies"])),
            env_vars,
            start_commands: texts(
                field(
                    obj,
                    &["start_commands", "startCommands", "start_command", "startCommand"],
                ),
                false,
            ),
            ports: ports(field(obj, &["ports", "port"])),
            notes,
        }
    }
}

/// Paths named by a path-selection reply, in the order given.
pub fn parse_path_selection(text: &str) -> Vec<String> {
    let items = first_json_array(text).or_else(|| {
        first_json_object(text).and_then(|obj| match field(&obj, &["paths", "files"]) {
            Some(Value::Array(items)) => Some(items.clone()),
            _ => None,
        })
    });

    let mut seen = HashSet::new();
    items
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_str)
        .map(|p| p.trim().trim_start_matches("./").trim_start_matches('/').to_string())
        .filter(|p| !p.is_empty() && seen.insert(p.clone()))
        .collect()
}

/// First present, non-null value among `keys`.
fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(b.to_string()),
        other => text(other),
    }
}

fn texts(value: Option<&Value>, split_commas: bool) -> Vec<String> {
    let raw: Vec<String> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(text).collect(),
        Some(Value::String(s)) if split_commas => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        Some(other) => text(other).into_iter().collect(),
        None => Vec::new(),
    };
    let mut seen = HashSet::new();
    raw.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "required" | "1"
        ),
        _ => false,
    }
}

fn coerce_port(value: &Value) -> Option<u16> {
    let raw = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => {
            let s = s.trim().trim_start_matches(':');
            let s = s
                .strip_suffix("/tcp")
                .or_else(|| s.strip_suffix("/udp"))
                .unwrap_or(s);
            s.trim().parse::<u64>().ok()
        }
        _ => None,
    }?;
    u16::try_from(raw).ok().filter(|p| *p >= 1)
}

/// Valid, unique ports with the preferred conventional port moved first.
pub fn ports(value: Option<&Value>) -> Vec<u16> {
    let candidates: Vec<Value> = match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => s.split(',').map(|p| Value::String(p.to_string())).collect(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    };

    let mut out: Vec<u16> = Vec::new();
    for port in candidates.iter().filter_map(coerce_port) {
        if !out.contains(&port) {
            out.push(port);
        }
    }
    if out.is_empty() {
        return vec![DEFAULT_PORT];
    }
    if let Some(preferred) = PREFERRED_PORTS.iter().find(|p| out.contains(p)) {
        out.retain(|p| p != preferred);
        out.insert(0, *preferred);
    }
    out
}

fn env_entry(name: &str, spec: Option<&Value>) -> EnvVar {
    let mut var = EnvVar {
        name: name.trim().to_string(),
        required: false,
        default: None,
        description: String::new(),
    };
    match spec {
        Some(Value::Object(o)) => {
            var.required = truthy(o.get("required"));
            var.default = field(o, &["default", "default_value", "defaultValue", "value"])
                .and_then(scalar_text);
            var.description = field(o, &["description", "desc"])
                .and_then(text)
                .unwrap_or_default();
        }
        Some(other) => var.default = scalar_text(other),
        None => {}
    }
    var
}

fn env_vars(value: Option<&Value>, notes: &mut Vec<String>) -> Vec<EnvVar> {
    let entries: Vec<EnvVar> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(o) => field(o, &["name", "key", "var"])
                    .and_then(text)
                    .map(|name| env_entry(&name, Some(item))),
                Value::String(s) => {
                    let (name, default) = match s.split_once('=') {
                        Some((n, d)) => (n, Some(Value::String(d.to_string()))),
                        None => (s.as_str(), None),
                    };
                    Some(env_entry(name, default.as_ref()))
                }
                _ => None,
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, spec)| env_entry(name, Some(spec).filter(|v| !v.is_null())))
            .collect(),
        _ => Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for var in entries {
        if !is_env_key(&var.name) {
            if !var.name.is_empty() {
                notes.push(format!("dropped invalid env var name {:?}", var.name));
            }
            continue;
        }
        if seen.insert(var.name.to_ascii_lowercase()) {
            out.push(var);
        }
    }
    out
}

fn dependencies(value: Option<&Value>) -> Vec<Dependency> {
    let dep = |name: &str, version: Option<&Value>, source: Option<&Value>| Dependency {
        name: name.trim().to_string(),
        version: version.and_then(text),
        source: source
            .and_then(text)
            .unwrap_or_else(|| "unspecified".to_string()),
    };

    let entries: Vec<Dependency> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(o) => field(o, &["name", "package"])
                    .and_then(text)
                    .map(|name| dep(&name, field(o, &["version", "spec"]), o.get("source"))),
                Value::String(s) => Some(dep(s, None, None)),
                _ => None,
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, version)| dep(name, Some(version), None))
            .collect(),
        _ => Vec::new(),
    };
    entries.into_iter().filter(|d| !d.name.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn conventional_port_is_preferred() {
        let report =
            ConfigNormalizer::normalize_object(&obj(json!({"ports": [3000, "8080", 22]})));
        assert_eq!(report.ports, vec![8080, 3000, 22]);
        assert_eq!(report.primary_port(), 8080);
    }

    #[test]
    fn ports_coerced_and_range_checked() {
        let report = ConfigNormalizer::normalize_object(&obj(json!({
            "ports": ["abc", 0, 70000, -1, " :3000 ", "9000/tcp", 3000, 4.0, 4.5, null]
        })));
        assert_eq!(report.ports, vec![3000, 9000, 4]);
    }

    #[test]
    fn all_invalid_ports_default() {
        let report = ConfigNormalizer::normalize_object(&obj(json!({"ports": ["x", 99999]})));
        assert_eq!(report.ports, vec![8000]);
    }

    #[test]
    fn scalar_port_and_start_command_shapes() {
        let report = ConfigNormalizer::normalize_object(&obj(json!({
            "Language": "ignored",
            "language": "  Python ",
            "port": "5000",
            "start_command": "gunicorn app:app",
            "languageVersion": 3.11
        })));
        assert_eq!(report.language, "python");
        assert_eq!(report.ports, vec![5000]);
        assert_eq!(report.start_commands, vec!["gunicorn app:app"]);
        assert_eq!(report.language_version.as_deref(), Some("3.11"));
    }

    #[test]
    fn env_dedup_is_case_insensitive_first_wins() {
        let report = ConfigNormalizer::normalize_object(&obj(json!({
            "env_vars": [
                {"name": "Api_Key", "required": true, "description": "first"},
                {"name": "API_KEY", "default": "second"},
                "DEBUG=1",
                {"name": "bad name", "default": "x"},
                {"default": "orphan"}
            ]
        })));
        let names: Vec<&str> = report.env_vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Api_Key", "DEBUG"]);
        assert!(report.env_vars[0].required);
        assert_eq!(report.env_vars[0].description, "first");
        assert_eq!(report.env_vars[1].default.as_deref(), Some("1"));
        assert!(report.notes.iter().any(|n| n.contains("bad name")));
        assert!(report.violations().is_empty());
    }

    #[test]
    fn env_object_shape() {
        let report = ConfigNormalizer::normalize_object(&obj(json!({
            "env": {"SECRET_KEY": null, "WORKERS": 4, "MODE": {"default": "prod", "required": "yes"}}
        })));
        let secret = report.env_var("SECRET_KEY").unwrap();
        assert!(secret.default.is_none());
        assert_eq!(report.env_var("WORKERS").unwrap().default.as_deref(), Some("4"));
        let mode = report.env_var("MODE").unwrap();
        assert!(mode.required);
        assert_eq!(mode.default.as_deref(), Some("prod"));
    }

    #[test]
    fn dependencies_keep_named_entries_and_versions_untouched() {
        let report = ConfigNormalizer::normalize_object(&obj(json!({
            "dependencies": [
                {"name": "flask", "version": ">=2,<3", "source": "requirements.txt"},
                {"name": "", "version": "1"},
                "gunicorn",
                42
            ],
            "devDependencies": {"pytest": "^7"},
            "frameworks": ["flask", "", "flask"]
        })));
        assert_eq!(report.dependencies.len(), 2);
        assert_eq!(report.dependencies[0].version.as_deref(), Some(">=2,<3"));
        assert_eq!(report.dependencies[1].source, "unspecified");
        assert_eq!(report.dev_dependencies[0].name, "pytest");
        assert_eq!(report.frameworks.len(), 1);
    }

    #[test]
    fn wrong_types_yield_defaults() {
        let report = ConfigNormalizer::normalize_object(&obj(json!({
            "language": ["python"],
            "ports": {"http": 80},
            "env_vars": "PORT",
            "start_commands": 7,
            "dependencies": true
        })));
        assert_eq!(report.language, "unknown");
        assert_eq!(report.ports, vec![8000]);
        assert!(report.env_vars.is_empty());
        assert_eq!(report.start_commands, vec!["7"]);
        assert!(report.dependencies.is_empty());
        assert!(report.violations().is_empty());
    }

    #[test]
    fn unparseable_oracle_text_falls_back() {
        let corpus = EvidenceCorpus::empty(10);
        for raw in ["", "{\"language\": \"py", "I think it is a Flask app."] {
            let normalized = ConfigNormalizer::normalize(Some(raw), &corpus);
            assert_eq!(normalized.source, JudgmentSource::Defaults);
            assert_eq!(normalized.report.ports, vec![8000]);
            assert!(normalized.report.violations().is_empty());
        }
    }

    #[test]
    fn oracle_judgment_is_used_when_it_parses() {
        let corpus = EvidenceCorpus::empty(10);
        let normalized = ConfigNormalizer::normalize(
            Some("```json\n{\"language\": \"Go\", \"ports\": [\"8080\"]}\n```"),
            &corpus,
        );
        assert_eq!(normalized.source, JudgmentSource::Oracle);
        assert_eq!(normalized.report.language, "go");
        assert_eq!(normalized.report.ports, vec![8080]);
    }

    #[test]
    fn path_selection_reply_shapes() {
        assert_eq!(
            parse_path_selection("Pick: [\"./app.py\", \"README.md\", \"app.py\", 3]"),
            vec!["app.py", "README.md"]
        );
        assert_eq!(
            parse_path_selection("{\"paths\": [\"/Dockerfile\"]}"),
            vec!["Dockerfile"]
        );
        assert!(parse_path_selection("none").is_empty());
    }
}
