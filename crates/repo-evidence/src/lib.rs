//! Repo-Evidence: repository evidence collection for Autodeploy
//!
//! This crate provides the evidence layer of the inference pipeline.
//! It interfaces with source-control hosts (GitHub REST + raw content) and
//! local checkouts, decides which files are worth reading, and assembles
//! them into a byte-budgeted [`EvidenceCorpus`].
//!
//! ## Stage 1 - Evidence
//!
//! Focus: deterministic selection under hard size limits.

pub mod corpus;
pub mod error;
pub mod fakes;
pub mod github;
pub mod local;
pub mod select;
pub mod source;

pub use corpus::{
    cut_to_bytes, CorpusAssembler, CorpusBudget, CorpusOutcome, EvidenceCorpus, FileHandle,
    SkippedCandidate, Truncation, TRUNCATION_MARKER,
};
pub use error::EvidenceError;
pub use github::{parse_repo_url, repo_name_from_url, GithubConfig, GithubSource, RepoRef};
pub use local::LocalSource;
pub use select::{fallback_candidates, prioritize_candidates, readme_paths};
pub use source::EvidenceSource;

/// Result type for evidence operations
pub type Result<T> = std::result::Result<T, EvidenceError>;
