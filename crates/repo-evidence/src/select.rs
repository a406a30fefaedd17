//! Candidate path prioritisation
//!
//! Decides which repository files are worth examining, in priority order.
//! README files always lead; then the oracle's picks; with a deterministic
//! fallback to well-known root files when the oracle offers nothing usable.

use std::collections::HashSet;

/// README variants recognised at the repository root (lower-case).
pub const README_NAMES: &[&str] = &[
    "readme",
    "readme.md",
    "readme.txt",
    "readme.rst",
    "readme.mdown",
    "readme.markdown",
];

/// Root files that usually carry runtime, dependency or deployment details.
pub const PREFERRED_ROOT_FILES: &[&str] = &[
    "requirements.txt",
    "pyproject.toml",
    "pipfile",
    "poetry.lock",
    "setup.py",
    "setup.cfg",
    "package.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "go.mod",
    "gemfile",
    "cargo.toml",
    "pom.xml",
    "build.gradle",
    "dockerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
    "procfile",
    "runtime.txt",
    ".python-version",
    ".tool-versions",
    ".nvmrc",
    ".node-version",
    ".env",
    ".env.example",
    "env.example",
    "environment.yml",
    "conda.yml",
    "makefile",
];

/// Maximum number of tree paths listed in a path-selection prompt.
pub const MAX_TREE_PATHS_FOR_PROMPT: usize = 5000;

fn is_root(path: &str) -> bool {
    !path.contains('/')
}

/// Root-level README paths present in `all_paths`, in tree order.
pub fn readme_paths(all_paths: &[String]) -> Vec<String> {
    all_paths
        .iter()
        .filter(|p| is_root(p) && README_NAMES.contains(&p.to_lowercase().as_str()))
        .cloned()
        .collect()
}

/// Deterministic fallback: preferred root files (in the preference order
/// above), then the remaining root files in tree order.
pub fn fallback_candidates(all_paths: &[String]) -> Vec<String> {
    let roots: Vec<&String> = all_paths.iter().filter(|p| is_root(p)).collect();
    let mut out = Vec::new();
    for preferred in PREFERRED_ROOT_FILES {
        if let Some(p) = roots.iter().find(|p| p.to_lowercase() == *preferred) {
            out.push((*p).clone());
        }
    }
    for p in roots {
        if !out.contains(p) {
            out.push(p.clone());
        }
    }
    out
}

/// Build the ordered candidate list fed to the corpus assembler.
///
/// * README files first,
/// * then `oracle_picks` that exist in `all_paths` (oracle order),
/// * or, when no pick survives, [`fallback_candidates`],
///
/// deduplicated and capped at `max_files`.
pub fn prioritize_candidates(
    all_paths: &[String],
    oracle_picks: &[String],
    max_files: usize,
) -> Vec<String> {
    let existing: HashSet<&str> = all_paths.iter().map(String::as_str).collect();
    let picks: Vec<String> = oracle_picks
        .iter()
        .filter(|p| existing.contains(p.as_str()))
        .cloned()
        .collect();

    let tail = if picks.is_empty() {
        fallback_candidates(all_paths)
    } else {
        picks
    };

    let mut seen = HashSet::new();
    readme_paths(all_paths)
        .into_iter()
        .chain(tail)
        .filter(|p| seen.insert(p.clone()))
        .take(max_files)
        .collect()
}
