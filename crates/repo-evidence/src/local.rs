//! Local checkout evidence source

use crate::error::EvidenceError;
use crate::source::EvidenceSource;
use crate::Result;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Directories never worth listing as evidence.
const SKIPPED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    ".venv",
    "venv",
    "__pycache__",
    ".tox",
    "dist",
    "build",
];

/// Evidence source reading a directory on disk.
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    /// Create a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalSource { root: root.into() }
    }

    /// Root directory of this source.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        // Only plain relative components; nothing may escape the root.
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(EvidenceError::NotFound {
                path: path.to_string(),
            });
        }
        Ok(self.root.join(rel))
    }
}

/// Recursive directory walk producing `/`-separated relative paths.
fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let name = entry.file_name();
            if SKIPPED_DIRS.iter().any(|s| name == std::ffi::OsStr::new(s)) {
                continue;
            }
            walk(root, &path, out)?;
        } else if file_type.is_file() {
            if let Ok(rel) = path.strip_prefix(root) {
                let parts: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                out.push(parts.join("/"));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl EvidenceSource for LocalSource {
    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }

    async fn fetch_tree(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        let mut paths = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            walk(&root, &root, &mut out).map(|_| out)
        })
        .await
        .map_err(|e| EvidenceError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        paths.sort();
        Ok(paths)
    }

    async fn fetch_content(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EvidenceError::NotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}
