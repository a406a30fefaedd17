//! GitHub evidence source
//!
//! Resolves a repository reference through the GitHub REST API and reads
//! file contents from the raw-content host.

use crate::error::EvidenceError;
use crate::source::EvidenceSource;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";

/// A parsed repository address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
    /// Branch, tag or commit SHA; `None` means the default branch.
    pub git_ref: Option<String>,
}

impl RepoRef {
    /// Canonical clone URL for this repository.
    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.repo)
    }
}

/// Parse a GitHub repository URL.
///
/// Accepts `https://github.com/<owner>/<repo>[.git][/tree/<ref>]` and
/// `git@github.com:<owner>/<repo>[.git]`.
pub fn parse_repo_url(url: &str) -> Result<RepoRef> {
    let url = url.trim();

    if let Some(rest) = url.strip_prefix("git@github.com:") {
        let rest = rest.trim_matches('/');
        let rest = rest.strip_suffix(".git").unwrap_or(rest);
        let (owner, repo) = rest
            .split_once('/')
            .ok_or_else(|| EvidenceError::InvalidRepoUrl(url.to_string()))?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(EvidenceError::InvalidRepoUrl(url.to_string()));
        }
        return Ok(RepoRef {
            owner: owner.to_string(),
            repo: repo.to_string(),
            git_ref: None,
        });
    }

    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| EvidenceError::InvalidRepoUrl(url.to_string()))?;
    let (host, path) = without_scheme
        .split_once('/')
        .ok_or_else(|| EvidenceError::InvalidRepoUrl(url.to_string()))?;
    if host != "github.com" && host != "www.github.com" {
        return Err(EvidenceError::InvalidRepoUrl(url.to_string()));
    }

    let path = path.split(['?', '#']).next().unwrap_or_default();
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return Err(EvidenceError::InvalidRepoUrl(url.to_string()));
    }

    let repo = parts[1].strip_suffix(".git").unwrap_or(parts[1]);
    let git_ref = if parts.len() >= 4 && parts[2] == "tree" {
        Some(parts[3..].join("/"))
    } else {
        None
    };

    Ok(RepoRef {
        owner: parts[0].to_string(),
        repo: repo.to_string(),
        git_ref,
    })
}

/// Last path segment of a repository URL without a trailing `.git`.
pub fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

/// GitHub access configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GithubConfig {
    /// REST API base URL
    pub api_base: String,
    /// Raw content base URL
    pub raw_base: String,
    /// Token for private repositories and higher rate limits
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        GithubConfig {
            api_base: DEFAULT_API_BASE.to_string(),
            raw_base: DEFAULT_RAW_BASE.to_string(),
            token: None,
        }
    }
}

impl GithubConfig {
    /// Create a config from environment variables (`GITHUB_TOKEN`).
    pub fn from_env() -> Self {
        GithubConfig {
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            ..Default::default()
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitRefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitRefResponse {
    object: GitRefObject,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

/// Evidence source backed by the GitHub API.
pub struct GithubSource {
    repo: RepoRef,
    git_ref: String,
    sha: String,
    config: GithubConfig,
    http_client: reqwest::Client,
}

impl GithubSource {
    /// Connect to a repository, resolving its ref to a commit SHA.
    pub async fn connect(repo: RepoRef, config: GithubConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("autodeploy-repo-evidence/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let git_ref = match &repo.git_ref {
            Some(r) => r.clone(),
            None => resolve_default_branch(&http_client, &config, &repo).await?,
        };
        let sha = resolve_sha(&http_client, &config, &repo, &git_ref).await?;
        info!(owner = %repo.owner, repo = %repo.repo, git_ref = %git_ref, sha = %sha, "Resolved repository ref");

        Ok(GithubSource {
            repo,
            git_ref,
            sha,
            config,
            http_client,
        })
    }

    /// The branch/tag/SHA used to fetch content.
    pub fn git_ref(&self) -> &str {
        &self.git_ref
    }

    /// The resolved commit SHA (or the ref itself if it could not be resolved).
    pub fn sha(&self) -> &str {
        &self.sha
    }
}

fn api_request(
    client: &reqwest::Client,
    config: &GithubConfig,
    url: &str,
) -> reqwest::RequestBuilder {
    let req = client
        .get(url)
        .header("Accept", "application/vnd.github+json");
    match &config.token {
        Some(token) => req.bearer_auth(token),
        None => req,
    }
}

async fn resolve_default_branch(
    client: &reqwest::Client,
    config: &GithubConfig,
    repo: &RepoRef,
) -> Result<String> {
    let url = format!("{}/repos/{}/{}", config.api_base, repo.owner, repo.repo);
    let resp = api_request(client, config, &url).send().await?;
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(EvidenceError::RepoNotFound(format!(
            "{}/{}",
            repo.owner, repo.repo
        )));
    }
    if !resp.status().is_success() {
        return Err(EvidenceError::Status {
            status: resp.status().as_u16(),
            url,
        });
    }
    let info: RepoInfo = resp.json().await?;
    Ok(info.default_branch.unwrap_or_else(|| "main".to_string()))
}

async fn resolve_sha(
    client: &reqwest::Client,
    config: &GithubConfig,
    repo: &RepoRef,
    git_ref: &str,
) -> Result<String> {
    for kind in ["heads", "tags"] {
        let url = format!(
            "{}/repos/{}/{}/git/refs/{}/{}",
            config.api_base, repo.owner, repo.repo, kind, git_ref
        );
        let resp = api_request(client, config, &url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(git_ref, kind, "Ref not found, trying next kind");
            continue;
        }
        if !resp.status().is_success() {
            return Err(EvidenceError::Status {
                status: resp.status().as_u16(),
                url,
            });
        }
        let parsed: GitRefResponse = resp.json().await?;
        return Ok(parsed.object.sha);
    }
    // Neither a branch nor a tag: assume a commit SHA.
    Ok(git_ref.to_string())
}

#[async_trait]
impl EvidenceSource for GithubSource {
    fn describe(&self) -> String {
        format!(
            "github:{}/{}@{}",
            self.repo.owner, self.repo.repo, self.git_ref
        )
    }

    async fn fetch_tree(&self) -> Result<Vec<String>> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.config.api_base, self.repo.owner, self.repo.repo, self.sha
        );
        let resp = api_request(&self.http_client, &self.config, &url)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(EvidenceError::Status {
                status: resp.status().as_u16(),
                url,
            });
        }
        let tree: TreeResponse = resp.json().await?;
        if tree.truncated {
            tracing::warn!(repo = %self.repo.repo, "GitHub returned a truncated tree listing");
        }
        Ok(tree
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|e| e.path)
            .collect())
    }

    async fn fetch_content(&self, path: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/{}/{}/{}/{}",
            self.config.raw_base, self.repo.owner, self.repo.repo, self.git_ref, path
        );
        let mut req = self.http_client.get(&url).header("Accept", "text/plain");
        if let Some(token) = &self.config.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EvidenceError::NotFound {
                path: path.to_string(),
            });
        }
        if !resp.status().is_success() {
            return Err(EvidenceError::Status {
                status: resp.status().as_u16(),
                url,
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}
