//! Source-host collaborator and archive extraction.
//!
//! The pipeline needs three things from the host: the commit hash at the head
//! of the configured branch (the cache key), a zip archive of the tree at
//! that commit, and optionally the diff of that commit. [`BitbucketHost`]
//! serves them from the Bitbucket Cloud REST API with basic auth.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::config::SourceConfig;
use crate::models::DocRequest;

/// Identifies a repository and the credentials to read it.
#[derive(Clone)]
pub struct RepoRef {
    pub workspace: String,
    pub repo: String,
    pub username: String,
    pub token: String,
}

impl RepoRef {
    pub fn from_request(req: &DocRequest) -> Self {
        Self {
            workspace: req.workspace_name.clone(),
            repo: req.repo_name.clone(),
            username: req.org_admin_email.clone(),
            token: req.access_token.clone(),
        }
    }

    pub fn slug(&self) -> String {
        format!("{}/{}", self.workspace, self.repo)
    }
}

impl std::fmt::Debug for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoRef")
            .field("workspace", &self.workspace)
            .field("repo", &self.repo)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// A source-control host that can describe and export a repository.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Commit hash at the head of the configured branch.
    async fn head_commit(&self, repo: &RepoRef) -> Result<String>;

    /// Zip archive of the repository tree at the head of the branch.
    async fn download_archive(&self, repo: &RepoRef) -> Result<Vec<u8>>;

    /// Diff introduced by `commit_hash`.
    async fn latest_diff(&self, repo: &RepoRef, commit_hash: &str) -> Result<String>;
}

/// Bitbucket Cloud.
pub struct BitbucketHost {
    client: reqwest::Client,
    config: SourceConfig,
}

impl BitbucketHost {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build source host HTTP client")?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn auth_header(repo: &RepoRef) -> String {
        let raw = format!("{}:{}", repo.username, repo.token);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw.as_bytes())
        )
    }

    async fn get(&self, repo: &RepoRef, url: &str, accept: &str, timeout: u64) -> Result<reqwest::Response> {
        let resp = self
            .client
            .get(url)
            .header("Authorization", Self::auth_header(repo))
            .header("Accept", accept)
            .timeout(Duration::from_secs(timeout))
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "GET {} failed (HTTP {}): {}",
                url,
                status,
                body.chars().take(300).collect::<String>()
            );
        }
        Ok(resp)
    }
}

#[async_trait]
impl SourceHost for BitbucketHost {
    async fn head_commit(&self, repo: &RepoRef) -> Result<String> {
        let url = format!(
            "{}/{}/{}/src/{}/",
            self.config.api_base.trim_end_matches('/'),
            repo.workspace,
            repo.repo,
            self.config.branch
        );
        let json: Value = self
            .get(repo, &url, "application/json", self.config.commit_timeout_secs)
            .await?
            .json()
            .await
            .context("invalid JSON from source listing")?;

        parse_head_commit(&json)
            .ok_or_else(|| anyhow::anyhow!("no commit hash in source listing of {}", repo.slug()))
    }

    async fn download_archive(&self, repo: &RepoRef) -> Result<Vec<u8>> {
        let url = format!(
            "{}/{}/{}/get/{}.zip",
            self.config.archive_base.trim_end_matches('/'),
            repo.workspace,
            repo.repo,
            self.config.branch
        );
        let bytes = self
            .get(repo, &url, "application/octet-stream", self.config.timeout_secs)
            .await?
            .bytes()
            .await
            .context("failed to read archive body")?;
        debug!(repo = %repo.slug(), bytes = bytes.len(), "archive downloaded");
        Ok(bytes.to_vec())
    }

    async fn latest_diff(&self, repo: &RepoRef, commit_hash: &str) -> Result<String> {
        let url = format!(
            "{}/{}/{}/diff/{}",
            self.config.api_base.trim_end_matches('/'),
            repo.workspace,
            repo.repo,
            commit_hash
        );
        let bytes = self
            .get(repo, &url, "text/plain", self.config.commit_timeout_secs)
            .await?
            .bytes()
            .await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// First commit hash in a `/src/{branch}/` listing, preferring file entries.
fn parse_head_commit(json: &Value) -> Option<String> {
    let values = json.get("values")?.as_array()?;
    let hash_of = |item: &Value| {
        item.get("commit")
            .and_then(|c| c.get("hash"))
            .and_then(|h| h.as_str())
            .map(str::to_string)
    };
    values
        .iter()
        .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("commit_file"))
        .find_map(hash_of)
        .or_else(|| values.iter().find_map(hash_of))
}

/// Extract a zip archive into `dest`.
///
/// Entries whose path would escape `dest` are rejected.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).context("invalid zip archive")?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let relative = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => bail!("archive entry escapes extraction root: {}", entry.name()),
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        std::io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}
