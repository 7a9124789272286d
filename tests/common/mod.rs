//! Fake collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use autodoc::cache::{CacheStore, MemoryCacheStore};
use autodoc::config::Config;
use autodoc::error::ModelError;
use autodoc::model::ModelBackend;
use autodoc::pipeline::Pipeline;
use autodoc::source::{RepoRef, SourceHost};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SECTION_HEADINGS: [&str; 7] = [
    "Service Overview",
    "API Details",
    "DAO Table Details",
    "Security",
    "Observability",
    "Setup the Service",
    "Recommendations",
];

/// Answers by prompt shape so concurrent calls stay deterministic.
pub struct FakeModel {
    calls: AtomicUsize,
    /// Prompts containing this text fail with `InvocationFailed`.
    fail_on: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_on: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_on(needle: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_on: Some(needle.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of prompts received that contain `needle`.
    pub fn prompts_containing(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

#[async_trait]
impl ModelBackend for FakeModel {
    fn name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(needle) = &self.fail_on {
            if prompt.contains(needle.as_str()) {
                return Err(ModelError::InvocationFailed("HTTP 500".into()));
            }
        }
        if prompt.contains("<files>") {
            return Ok("<p>summary: GET /invoices</p>".to_string());
        }
        if prompt.contains("Merge the following HTML fragments") {
            return Ok("<html><body><h2>Merged</h2><p>all</p></body></html>".to_string());
        }
        for heading in SECTION_HEADINGS {
            if prompt.contains(&format!("Task: <h2>{}", heading)) {
                return Ok(format!("<h2>{}</h2><ul><li>generated</li></ul>", heading));
            }
        }
        Err(ModelError::InvocationFailed("unexpected prompt".into()))
    }
}

/// In-memory source host serving one fixed commit and archive.
pub struct FakeHost {
    commit: String,
    archive: Vec<u8>,
    reachable: bool,
    diff_available: bool,
    downloads: AtomicUsize,
}

impl FakeHost {
    pub fn new(commit: &str, archive: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            commit: commit.to_string(),
            archive,
            reachable: true,
            diff_available: true,
            downloads: AtomicUsize::new(0),
        })
    }

    /// Serves the commit and archive but fails every diff request.
    pub fn without_diff(commit: &str, archive: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            commit: commit.to_string(),
            archive,
            reachable: true,
            diff_available: false,
            downloads: AtomicUsize::new(0),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            commit: String::new(),
            archive: Vec::new(),
            reachable: false,
            diff_available: false,
            downloads: AtomicUsize::new(0),
        })
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceHost for FakeHost {
    async fn head_commit(&self, _repo: &RepoRef) -> anyhow::Result<String> {
        if !self.reachable {
            anyhow::bail!("GET /src/master/ failed (HTTP 401): bad credentials");
        }
        Ok(self.commit.clone())
    }

    async fn download_archive(&self, _repo: &RepoRef) -> anyhow::Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(self.archive.clone())
    }

    async fn latest_diff(&self, _repo: &RepoRef, _commit_hash: &str) -> anyhow::Result<String> {
        if !self.diff_available {
            anyhow::bail!("GET /diff failed (HTTP 500)");
        }
        Ok("+ @app.get('/invoices')".to_string())
    }
}

/// Cache whose reads or writes always fail, counting the writes attempted.
pub struct FailingCache {
    fail_get: bool,
    fail_put: bool,
    puts: AtomicUsize,
}

impl FailingCache {
    pub fn on_get() -> Arc<Self> {
        Arc::new(Self {
            fail_get: true,
            fail_put: false,
            puts: AtomicUsize::new(0),
        })
    }

    pub fn on_put() -> Arc<Self> {
        Arc::new(Self {
            fail_get: false,
            fail_put: true,
            puts: AtomicUsize::new(0),
        })
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for FailingCache {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get(&self, _commit_hash: &str) -> anyhow::Result<Option<String>> {
        if self.fail_get {
            anyhow::bail!("GET /docs/abc123.html failed (HTTP 403): AccessDenied");
        }
        Ok(None)
    }

    async fn put(&self, _commit_hash: &str, _html: &str) -> anyhow::Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_put {
            anyhow::bail!("PUT /docs/abc123.html failed (HTTP 503): SlowDown");
        }
        Ok(())
    }
}

pub fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    buf.into_inner()
}

/// A repository that partitions into two chunks under [`test_config`].
pub fn sample_archive() -> Vec<u8> {
    zip_of(&[
        ("acme-billing-abc123/README.md", "# Billing service"),
        (
            "acme-billing-abc123/src/app.py",
            "@app.get(\"/invoices\")\ndef list_invoices():\n    return db.query(Invoice).all()",
        ),
        ("acme-billing-abc123/node_modules/lib/index.js", "module.exports = {}"),
        ("acme-billing-abc123/logo.png", "not really a png"),
    ])
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.pipeline.chunk_char_budget = 40;
    config.pipeline.backoff_base_ms = 0;
    config.cache.backend = "memory".to_string();
    config
}

pub fn pipeline_with(
    config: Config,
    model: Arc<FakeModel>,
    host: Arc<FakeHost>,
) -> (Pipeline, Arc<MemoryCacheStore>) {
    let cache = Arc::new(MemoryCacheStore::new());
    let pipeline = Pipeline::new(config, model, cache.clone(), host);
    (pipeline, cache)
}

pub fn request() -> autodoc::models::DocRequest {
    serde_json::from_value(serde_json::json!({
        "repoName": "billing",
        "workspaceName": "acme",
        "orgAdminEmail": "admin@acme.io",
        "accessToken": "secret"
    }))
    .unwrap()
}
