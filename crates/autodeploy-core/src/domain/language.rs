//! Runtime families the planner and bootstrap know how to handle.

use serde::{Deserialize, Serialize};

/// Start command when neither the report nor the operator supplies one and
/// the language is not recognised.
pub const FALLBACK_START_COMMAND: &str = "python3 app.py";

/// A language runtime family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFamily {
    Python,
    Node,
    Go,
    Ruby,
    Java,
    Rust,
}

impl RuntimeFamily {
    /// Runtimes the bootstrap can install natively, in fallback order.
    pub const NATIVE: [RuntimeFamily; 4] = [
        RuntimeFamily::Python,
        RuntimeFamily::Node,
        RuntimeFamily::Go,
        RuntimeFamily::Ruby,
    ];

    /// Map a report language (or a common alias) to a family.
    pub fn from_language(language: &str) -> Option<Self> {
        match language.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Some(RuntimeFamily::Python),
            "node" | "nodejs" | "node.js" | "javascript" | "js" | "typescript" | "ts" => {
                Some(RuntimeFamily::Node)
            }
            "go" | "golang" => Some(RuntimeFamily::Go),
            "ruby" | "rb" => Some(RuntimeFamily::Ruby),
            "java" | "kotlin" => Some(RuntimeFamily::Java),
            "rust" => Some(RuntimeFamily::Rust),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RuntimeFamily::Python => "python",
            RuntimeFamily::Node => "node",
            RuntimeFamily::Go => "go",
            RuntimeFamily::Ruby => "ruby",
            RuntimeFamily::Java => "java",
            RuntimeFamily::Rust => "rust",
        }
    }

    /// Upper-case label used in bootstrap state names.
    pub fn label(self) -> &'static str {
        match self {
            RuntimeFamily::Python => "PYTHON",
            RuntimeFamily::Node => "NODE",
            RuntimeFamily::Go => "GO",
            RuntimeFamily::Ruby => "RUBY",
            RuntimeFamily::Java => "JAVA",
            RuntimeFamily::Rust => "RUST",
        }
    }

    pub fn default_start_command(self) -> &'static str {
        match self {
            RuntimeFamily::Python => "python app.py",
            RuntimeFamily::Node => "npm start",
            RuntimeFamily::Go => "go run .",
            RuntimeFamily::Ruby => "bundle exec ruby app.rb",
            RuntimeFamily::Java => "java -jar app.jar",
            RuntimeFamily::Rust => "cargo run --release",
        }
    }

    /// Files whose presence in a checkout indicates this runtime.
    pub fn marker_files(self) -> &'static [&'static str] {
        match self {
            RuntimeFamily::Python => &["requirements.txt", "pyproject.toml", "Pipfile", "setup.py"],
            RuntimeFamily::Node => &["package.json"],
            RuntimeFamily::Go => &["go.mod"],
            RuntimeFamily::Ruby => &["Gemfile"],
            RuntimeFamily::Java => &["pom.xml", "build.gradle"],
            RuntimeFamily::Rust => &["Cargo.toml"],
        }
    }

    pub fn supports_native(self) -> bool {
        Self::NATIVE.contains(&self)
    }
}

impl std::fmt::Display for RuntimeFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Language-specific default start command.
pub fn default_start_command(language: &str) -> &'static str {
    RuntimeFamily::from_language(language)
        .map(RuntimeFamily::default_start_command)
        .unwrap_or(FALLBACK_START_COMMAND)
}
