//! Content-addressed document cache.
//!
//! Documents are stored under `"{commit_hash}.html"`. A commit hash changes
//! whenever the repository changes, so entries are never invalidated: a hit
//! is always valid for exactly that snapshot.
//!
//! | Backend | Store |
//! |---------|-------|
//! | `s3` | [`S3CacheStore`]: S3 (or MinIO/LocalStack) via SigV4 |
//! | `filesystem` | [`FsCacheStore`]: one file per commit in a directory |
//! | `memory` | [`MemoryCacheStore`]: process-local, for tests and dry runs |
//!
//! A missing key is `Ok(None)`, never an error.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::aws::{self, AwsCredentials, SigV4Request};
use crate::config::CacheConfig;
use crate::models::CacheEntry;

/// Key/value store of finished documents, keyed by commit hash.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the backend name used in logs.
    fn name(&self) -> &str;

    /// Fetch the document for `commit_hash`, or `None` on a miss.
    async fn get(&self, commit_hash: &str) -> Result<Option<String>>;

    /// Store the document for `commit_hash`.
    async fn put(&self, commit_hash: &str, html: &str) -> Result<()>;
}

/// Create the store selected by `config.backend`.
pub fn create_cache(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    match config.backend.as_str() {
        "s3" => Ok(Arc::new(S3CacheStore::new(config)?)),
        "filesystem" => Ok(Arc::new(FsCacheStore::new(config.dir.clone()))),
        "memory" => Ok(Arc::new(MemoryCacheStore::new())),
        other => bail!("Unknown cache backend: {}", other),
    }
}

// ============ S3 ============

/// Cache in an S3 bucket, one `text/html` object per commit.
pub struct S3CacheStore {
    client: reqwest::Client,
    creds: AwsCredentials,
    bucket: String,
    region: String,
    scheme: &'static str,
    host: String,
    /// Path-style addressing (`/{bucket}/{key}`), used with custom endpoints.
    path_style: bool,
}

impl S3CacheStore {
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Self::with_credentials(config, AwsCredentials::from_env()?)
    }

    pub fn with_credentials(config: &CacheConfig, creds: AwsCredentials) -> Result<Self> {
        let bucket = config
            .bucket
            .clone()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| anyhow::anyhow!("cache.bucket required for the s3 cache"))?;

        let (scheme, host, path_style) = match config.endpoint_url {
            Some(ref endpoint) => (aws::endpoint_scheme(endpoint), aws::endpoint_host(endpoint), true),
            None => (
                "https",
                format!("{}.s3.{}.amazonaws.com", bucket, config.region),
                false,
            ),
        };

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build S3 HTTP client")?;

        Ok(Self {
            client,
            creds,
            bucket,
            region: config.region.clone(),
            scheme,
            host,
            path_style,
        })
    }

    fn object_path(&self, commit_hash: &str) -> String {
        let key = aws::uri_encode(&CacheEntry::object_key(commit_hash));
        if self.path_style {
            format!("/{}/{}", aws::uri_encode(&self.bucket), key)
        } else {
            format!("/{}", key)
        }
    }

    fn signed_request(
        &self,
        method: reqwest::Method,
        path: &str,
        payload: &[u8],
    ) -> reqwest::RequestBuilder {
        let signed = aws::sign(
            &self.creds,
            &SigV4Request {
                method: method.as_str(),
                host: &self.host,
                canonical_uri: path,
                query: &[],
                payload,
                region: &self.region,
                service: "s3",
            },
        );
        let url = format!("{}://{}{}", self.scheme, self.host, path);
        signed.apply(self.client.request(method, url))
    }
}

#[async_trait]
impl CacheStore for S3CacheStore {
    fn name(&self) -> &str {
        "s3"
    }

    async fn get(&self, commit_hash: &str) -> Result<Option<String>> {
        let path = self.object_path(commit_hash);
        let resp = self
            .signed_request(reqwest::Method::GET, &path, b"")
            .send()
            .await
            .with_context(|| format!("Failed to get s3://{}{}", self.bucket, path))?;

        let status = resp.status();
        if status.as_u16() == 404 {
            debug!(bucket = %self.bucket, commit = commit_hash, "cache miss");
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if body.contains("<Code>NoSuchKey</Code>") {
                return Ok(None);
            }
            bail!(
                "S3 GetObject failed (HTTP {}) for commit '{}': {}",
                status,
                commit_hash,
                body.chars().take(500).collect::<String>()
            );
        }

        let bytes = resp.bytes().await?;
        let html = String::from_utf8(bytes.to_vec())
            .with_context(|| format!("cached document for {} is not UTF-8", commit_hash))?;
        Ok(Some(html))
    }

    async fn put(&self, commit_hash: &str, html: &str) -> Result<()> {
        let path = self.object_path(commit_hash);
        let resp = self
            .signed_request(reqwest::Method::PUT, &path, html.as_bytes())
            .header("Content-Type", CacheEntry::CONTENT_TYPE)
            .body(html.to_string())
            .send()
            .await
            .with_context(|| format!("Failed to put s3://{}{}", self.bucket, path))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for commit '{}': {}",
                status,
                commit_hash,
                body.chars().take(500).collect::<String>()
            );
        }
        Ok(())
    }
}

// ============ Filesystem ============

/// Cache in a local directory.
pub struct FsCacheStore {
    dir: PathBuf,
}

impl FsCacheStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, commit_hash: &str) -> Result<PathBuf> {
        if commit_hash.is_empty()
            || commit_hash.contains(['/', '\\'])
            || commit_hash.starts_with('.')
        {
            bail!("invalid cache key: '{}'", commit_hash);
        }
        Ok(self.dir.join(CacheEntry::object_key(commit_hash)))
    }
}

#[async_trait]
impl CacheStore for FsCacheStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn get(&self, commit_hash: &str) -> Result<Option<String>> {
        let path = self.path_for(commit_hash)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(html) => Ok(Some(html)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn put(&self, commit_hash: &str, html: &str) -> Result<()> {
        let path = self.path_for(commit_hash)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create cache directory: {}", self.dir.display()))?;

        // Write-then-rename so readers never see a partial document.
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", commit_hash, uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, html.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move cache entry into {}", path.display()))?;
        Ok(())
    }
}

// ============ Memory ============

/// Process-local cache.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, commit_hash: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow::anyhow!("memory cache lock poisoned"))?;
        Ok(entries
            .get(&CacheEntry::object_key(commit_hash))
            .map(|entry| entry.html.clone()))
    }

    async fn put(&self, commit_hash: &str, html: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("memory cache lock poisoned"))?;
        entries.insert(
            CacheEntry::object_key(commit_hash),
            CacheEntry::new(commit_hash, html),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn roundtrip(store: &dyn CacheStore) {
        assert_eq!(store.get("abc123").await.unwrap(), None);

        let html = "<style>h2{}</style>\n<h2>Docs ✓</h2>";
        store.put("abc123", html).await.unwrap();
        assert_eq!(store.get("abc123").await.unwrap().as_deref(), Some(html));
        assert_eq!(store.get("def456").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryCacheStore::new();
        roundtrip(&store).await;
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_fs_store() {
        let tmp = TempDir::new().unwrap();
        let store = FsCacheStore::new(tmp.path().join("cache"));
        roundtrip(&store).await;
        assert!(tmp.path().join("cache/abc123.html").exists());
        // No temp files left behind.
        let leftovers = std::fs::read_dir(tmp.path().join("cache"))
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_fs_store_miss_on_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let store = FsCacheStore::new(tmp.path().join("never-created"));
        assert_eq!(store.get("abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fs_store_rejects_path_keys() {
        let tmp = TempDir::new().unwrap();
        let store = FsCacheStore::new(tmp.path().to_path_buf());
        assert!(store.put("../escape", "x").await.is_err());
        assert!(store.get("a/b").await.is_err());
    }

    #[test]
    fn test_s3_object_paths() {
        let creds = AwsCredentials {
            access_key_id: "id".into(),
            secret_access_key: "secret".into(),
            session_token: None,
        };
        let mut config = CacheConfig {
            backend: "s3".into(),
            bucket: Some("docs".into()),
            ..CacheConfig::default()
        };
        let store = S3CacheStore::with_credentials(&config, creds.clone()).unwrap();
        assert_eq!(store.host, "docs.s3.us-east-1.amazonaws.com");
        assert_eq!(store.object_path("abc"), "/abc.html");

        config.endpoint_url = Some("http://localhost:9000".into());
        let store = S3CacheStore::with_credentials(&config, creds).unwrap();
        assert_eq!(store.scheme, "http");
        assert_eq!(store.object_path("abc"), "/docs/abc.html");
    }

    #[test]
    fn test_create_cache_backends() {
        let config = CacheConfig {
            backend: "memory".into(),
            ..CacheConfig::default()
        };
        assert_eq!(create_cache(&config).unwrap().name(), "memory");
        let config = CacheConfig {
            backend: "redis".into(),
            ..CacheConfig::default()
        };
        assert!(create_cache(&config).is_err());
    }
}
