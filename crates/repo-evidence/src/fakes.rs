//! In-memory evidence source (testing only)
//!
//! Provides `MemorySource`, which satisfies the [`EvidenceSource`] contract
//! without touching the network or the filesystem. Individual paths can be
//! made to fail so callers can exercise their skip/fallback behaviour.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::EvidenceError;
use crate::source::EvidenceSource;
use crate::Result;

/// In-memory repository snapshot backed by a `BTreeMap<path, bytes>`.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: BTreeMap<String, Vec<u8>>,
    failing: BTreeSet<String>,
    fetches: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file to the snapshot.
    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.to_string(), content.into());
        self
    }

    /// Make fetches of `path` fail with a transport error.
    pub fn with_failure(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    /// Paths fetched so far, in call order.
    pub fn fetch_log(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvidenceSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory:{} files", self.files.len())
    }

    async fn fetch_tree(&self) -> Result<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }

    async fn fetch_content(&self, path: &str) -> Result<Vec<u8>> {
        self.fetches.lock().unwrap().push(path.to_string());
        if self.failing.contains(path) {
            return Err(EvidenceError::Http(format!("injected failure for {}", path)));
        }
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| EvidenceError::NotFound {
                path: path.to_string(),
            })
    }
}
