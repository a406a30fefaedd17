//! Evidence source abstraction
//!
//! An evidence source is bound to one repository at one ref. It lists the
//! blob paths of the tree and fetches individual file contents. Sources are
//! external collaborators: every call may fail and callers decide whether a
//! failure is fatal.

use async_trait::async_trait;

use crate::Result;

/// Read-only access to the files of one repository snapshot.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Human-readable description of where the evidence comes from.
    fn describe(&self) -> String;

    /// List every blob path in the snapshot (repo-relative, `/`-separated).
    async fn fetch_tree(&self) -> Result<Vec<String>>;

    /// Fetch the raw bytes of one file.
    ///
    /// Returns [`crate::EvidenceError::NotFound`] when the path does not exist.
    async fn fetch_content(&self, path: &str) -> Result<Vec<u8>>;
}
