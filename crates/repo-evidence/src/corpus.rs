//! Budgeted evidence corpus assembly
//!
//! The assembler walks a priority-ordered candidate list, fetches each file
//! from an [`EvidenceSource`], and appends it to the corpus while the global
//! byte budget has room. Invariants:
//!
//! - `used_bytes <= budget_cap` at all times;
//! - corpus order is candidate order;
//! - a file that overflows the remaining budget is cut to the remaining byte
//!   count, marked as truncated, kept, and ends the walk;
//! - failed fetches are skipped and never consume budget.
//!
//! Given identical candidates and identical fetched bytes the resulting
//! corpus (and its [`EvidenceCorpus::digest`]) is identical.

use crate::source::EvidenceSource;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Marker appended to the content of any truncated file.
pub const TRUNCATION_MARKER: &str = "\n[TRUNCATED]\n";

/// Placeholder used for files that are clearly not text.
pub const BINARY_PLACEHOLDER: &str = "[binary content omitted]";

/// Byte limits applied while assembling a corpus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CorpusBudget {
    /// Maximum number of candidates considered.
    pub max_files: usize,
    /// Hard cap per individual file.
    pub per_file_bytes: usize,
    /// Global cap across the whole corpus.
    pub total_bytes: usize,
}

impl Default for CorpusBudget {
    fn default() -> Self {
        CorpusBudget {
            max_files: 16,
            per_file_bytes: 200_000,
            total_bytes: 200_000,
        }
    }
}

/// Why a file's content was cut.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    /// File kept whole.
    None,
    /// Cut to the per-file cap; assembly continued.
    PerFileCap,
    /// Cut to the remaining global budget; assembly stopped.
    Budget,
}

/// One fetched file. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileHandle {
    path: String,
    content: String,
    byte_size: usize,
    truncation: Truncation,
}

impl FileHandle {
    /// Repo-relative path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Text content, including the truncation marker when truncated.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Bytes of repository evidence retained (the marker is not counted).
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn truncation(&self) -> Truncation {
        self.truncation
    }

    pub fn is_truncated(&self) -> bool {
        self.truncation != Truncation::None
    }

    /// Lower-cased final path segment.
    pub fn file_name(&self) -> String {
        self.path
            .rsplit('/')
            .next()
            .unwrap_or(&self.path)
            .to_lowercase()
    }
}

/// How the walk over candidates ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CorpusOutcome {
    /// Every candidate was considered.
    Complete,
    /// The global budget ran out; `truncated_path` is the file that was cut,
    /// if any, and `unvisited` counts candidates never fetched.
    BudgetExhausted {
        truncated_path: Option<String>,
        unvisited: usize,
    },
}

/// A candidate that could not be fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedCandidate {
    pub path: String,
    pub reason: String,
}

/// Ordered, budgeted collection of evidence files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceCorpus {
    files: Vec<FileHandle>,
    used_bytes: usize,
    budget_cap: usize,
    outcome: CorpusOutcome,
    skipped: Vec<SkippedCandidate>,
}

impl EvidenceCorpus {
    /// An empty corpus with the given cap. A valid, if degenerate, result.
    pub fn empty(budget_cap: usize) -> Self {
        EvidenceCorpus {
            files: Vec::new(),
            used_bytes: 0,
            budget_cap,
            outcome: CorpusOutcome::Complete,
            skipped: Vec::new(),
        }
    }

    pub fn files(&self) -> &[FileHandle] {
        &self.files
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileHandle> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn budget_cap(&self) -> usize {
        self.budget_cap
    }

    pub fn outcome(&self) -> &CorpusOutcome {
        &self.outcome
    }

    pub fn skipped(&self) -> &[SkippedCandidate] {
        &self.skipped
    }

    /// Look up a file by exact path.
    pub fn get(&self, path: &str) -> Option<&FileHandle> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Whether any file's name (case-insensitive) equals `name`.
    pub fn has_file_named(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.files.iter().any(|f| f.file_name() == name)
    }

    /// Paths in corpus order.
    pub fn paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// SHA-256 over `(path, content)` pairs in order.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for file in &self.files {
            hasher.update(file.path.as_bytes());
            hasher.update(b"\0");
            hasher.update(file.content.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }

    fn push(&mut self, path: &str, text: &str, truncation: Truncation) {
        let byte_size = text.len();
        let content = if truncation == Truncation::None {
            text.to_string()
        } else {
            format!("{}{}", text, TRUNCATION_MARKER)
        };
        self.used_bytes += byte_size;
        debug_assert!(self.used_bytes <= self.budget_cap);
        self.files.push(FileHandle {
            path: path.to_string(),
            content,
            byte_size,
            truncation,
        });
    }
}

/// Longest prefix of `text` that is at most `max` bytes and ends on a char
/// boundary.
pub fn cut_to_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn decode(bytes: &[u8]) -> String {
    if bytes.contains(&0) {
        return BINARY_PLACEHOLDER.to_string();
    }
    String::from_utf8_lossy(bytes).into_owned()
}

/// Builds an [`EvidenceCorpus`] from prioritised candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusAssembler {
    budget: CorpusBudget,
}

impl CorpusAssembler {
    pub fn new(budget: CorpusBudget) -> Self {
        CorpusAssembler { budget }
    }

    pub fn budget(&self) -> CorpusBudget {
        self.budget
    }

    /// Fetch candidates in priority order until the budget is used up.
    ///
    /// Never fails: fetch errors are logged and the candidate is skipped.
    pub async fn assemble(
        &self,
        source: &dyn EvidenceSource,
        candidates: &[String],
    ) -> EvidenceCorpus {
        let cap = self.budget.total_bytes;
        let mut corpus = EvidenceCorpus::empty(cap);
        let considered: Vec<&String> = candidates.iter().take(self.budget.max_files).collect();

        for (idx, path) in considered.iter().enumerate() {
            if corpus.used_bytes >= cap {
                corpus.outcome = CorpusOutcome::BudgetExhausted {
                    truncated_path: None,
                    unvisited: considered.len() - idx,
                };
                break;
            }

            let bytes = match source.fetch_content(path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path, error = %e, "Skipping evidence candidate");
                    corpus.skipped.push(SkippedCandidate {
                        path: path.to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let text = decode(&bytes);
            let per_file = cut_to_bytes(&text, self.budget.per_file_bytes);
            let mut truncation = if per_file.len() < text.len() {
                Truncation::PerFileCap
            } else {
                Truncation::None
            };

            let remaining = cap - corpus.used_bytes;
            if per_file.len() > remaining {
                let kept = cut_to_bytes(per_file, remaining);
                truncation = Truncation::Budget;
                corpus.push(path, kept, truncation);
                info!(
                    path = %path,
                    kept_bytes = kept.len(),
                    used_bytes = corpus.used_bytes,
                    budget = cap,
                    "Evidence budget exhausted"
                );
                corpus.outcome = CorpusOutcome::BudgetExhausted {
                    truncated_path: Some(path.to_string()),
                    unvisited: considered.len() - idx - 1,
                };
                break;
            }

            debug!(path = %path, bytes = per_file.len(), ?truncation, "Added evidence file");
            corpus.push(path, per_file, truncation);
        }

        corpus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemorySource;

    fn candidates(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cut_respects_char_boundaries() {
        assert_eq!(cut_to_bytes("héllo", 2), "h");
        assert_eq!(cut_to_bytes("héllo", 3), "hé");
        assert_eq!(cut_to_bytes("abc", 10), "abc");
        assert_eq!(cut_to_bytes("é", 1), "");
    }

    #[tokio::test]
    async fn overflowing_file_is_cut_and_stops_assembly() {
        let source = MemorySource::new()
            .with_file("README.md", "0123456789")
            .with_file("big.txt", "abcdefghijklmnopqrstuvwxyz")
            .with_file("after.txt", "never read");
        let assembler = CorpusAssembler::new(CorpusBudget {
            max_files: 10,
            per_file_bytes: 1_000,
            total_bytes: 15,
        });

        let corpus = assembler
            .assemble(&source, &candidates(&["README.md", "big.txt", "after.txt"]))
            .await;

        assert_eq!(corpus.used_bytes(), 15);
        assert_eq!(corpus.len(), 2);
        let big = corpus.get("big.txt").unwrap();
        assert_eq!(big.byte_size(), 5);
        assert_eq!(big.content(), format!("abcde{}", TRUNCATION_MARKER));
        assert_eq!(big.truncation(), Truncation::Budget);
        assert_eq!(
            corpus.outcome(),
            &CorpusOutcome::BudgetExhausted {
                truncated_path: Some("big.txt".to_string()),
                unvisited: 1,
            }
        );
        assert!(!source.fetch_log().contains(&"after.txt".to_string()));
    }

    #[tokio::test]
    async fn failed_fetch_is_skipped_without_budget() {
        let source = MemorySource::new()
            .with_file("a.txt", "aaaa")
            .with_failure("b.txt")
            .with_file("c.txt", "cccc");
        let assembler = CorpusAssembler::new(CorpusBudget {
            max_files: 10,
            per_file_bytes: 100,
            total_bytes: 100,
        });

        let corpus = assembler
            .assemble(&source, &candidates(&["a.txt", "b.txt", "missing", "c.txt"]))
            .await;

        assert_eq!(corpus.paths(), candidates(&["a.txt", "c.txt"]));
        assert_eq!(corpus.used_bytes(), 8);
        assert_eq!(corpus.skipped().len(), 2);
        assert_eq!(corpus.outcome(), &CorpusOutcome::Complete);
    }

    #[tokio::test]
    async fn per_file_cap_truncates_but_continues() {
        let source = MemorySource::new()
            .with_file("lock.json", "x".repeat(50))
            .with_file("app.py", "print('hi')");
        let assembler = CorpusAssembler::new(CorpusBudget {
            max_files: 10,
            per_file_bytes: 20,
            total_bytes: 1_000,
        });

        let corpus = assembler
            .assemble(&source, &candidates(&["lock.json", "app.py"]))
            .await;

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.files()[0].truncation(), Truncation::PerFileCap);
        assert_eq!(corpus.files()[0].byte_size(), 20);
        assert!(!corpus.files()[1].is_truncated());
        assert_eq!(corpus.outcome(), &CorpusOutcome::Complete);
    }

    #[tokio::test]
    async fn binary_content_is_replaced() {
        let source = MemorySource::new().with_file("logo.png", vec![0x89, 0x50, 0x00, 0x01]);
        let corpus = CorpusAssembler::default()
            .assemble(&source, &candidates(&["logo.png"]))
            .await;
        assert_eq!(corpus.files()[0].content(), BINARY_PLACEHOLDER);
    }

    #[tokio::test]
    async fn empty_candidates_yield_empty_corpus() {
        let source = MemorySource::new();
        let corpus = CorpusAssembler::default().assemble(&source, &[]).await;
        assert!(corpus.is_empty());
        assert_eq!(corpus.used_bytes(), 0);
        assert_eq!(corpus.outcome(), &CorpusOutcome::Complete);
    }
}
