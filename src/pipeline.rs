//! End-to-end orchestration of a documentation run.
//!
//! ```text
//! head commit ──► cache hit? ──yes──► cached document
//!                     │no
//!                     ▼
//! download archive ─► extract ─► load ─► partition
//!                                          │
//!                       map fan-out (one unit per chunk)
//!                                          │
//!              sections fan-out + stitch   or   unify call
//!                                          │
//!                                   cache.put ─► document
//! ```
//!
//! Collaborators (model backend, cache, source host) are injected, so the
//! same pipeline runs against Bedrock/S3/Bitbucket in production and against
//! in-memory fakes in tests.

use anyhow::Context;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, field, info, info_span, warn, Instrument, Span};

use crate::cache::{self, CacheStore};
use crate::chunk;
use crate::completion::generate_complete;
use crate::config::Config;
use crate::error::{GenerationError, PipelineError};
use crate::fanout::fan_out;
use crate::loader;
use crate::merge::{self, MergeStrategy};
use crate::model::{self, ModelBackend, ModelInvoker};
use crate::models::{DocRequest, FileRecord, Fragment, GenerationUnit, Section};
use crate::prompts;
use crate::source::{self, BitbucketHost, RepoRef, SourceHost};

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct DocOutcome {
    pub html: String,
    pub title: String,
    /// `true` when the document came from the cache without any model call.
    pub cached: bool,
    /// Cache key: the commit hash, or a content hash for local runs.
    pub commit: String,
}

/// The documentation pipeline with its collaborators.
pub struct Pipeline {
    config: Config,
    invoker: ModelInvoker,
    cache: Arc<dyn CacheStore>,
    host: Arc<dyn SourceHost>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        backend: Arc<dyn ModelBackend>,
        cache: Arc<dyn CacheStore>,
        host: Arc<dyn SourceHost>,
    ) -> Self {
        let invoker = ModelInvoker::new(
            backend,
            config.pipeline.max_backoff_attempts,
            Duration::from_millis(config.pipeline.backoff_base_ms),
        );
        Self {
            config,
            invoker,
            cache,
            host,
        }
    }

    /// Build the production collaborators selected by `config`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let backend = model::create_backend(&config.model)?;
        let cache = cache::create_cache(&config.cache)?;
        let host = Arc::new(BitbucketHost::new(&config.source)?);
        info!(
            model = backend.name(),
            cache = cache.name(),
            strategy = ?config.pipeline.merge_strategy,
            "pipeline ready"
        );
        Ok(Self::new(config, backend, cache, host))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Document the head of a hosted repository.
    pub async fn run(&self, req: &DocRequest) -> Result<DocOutcome, PipelineError> {
        let span = info_span!(
            "run",
            repo = %format!("{}/{}", req.workspace_name, req.repo_name),
            commit = field::Empty
        );
        self.run_inner(req, span.clone()).instrument(span).await
    }

    async fn run_inner(&self, req: &DocRequest, span: Span) -> Result<DocOutcome, PipelineError> {
        let repo = RepoRef::from_request(req);
        let title = format!("Docs: {}", req.repo_name);

        let commit = self
            .host
            .head_commit(&repo)
            .await
            .map_err(PipelineError::UpstreamUnavailable)?;
        span.record("commit", commit.as_str());

        if let Some(html) = self.cached(&commit).await? {
            return Ok(DocOutcome {
                html,
                title,
                cached: true,
                commit,
            });
        }

        let archive = self
            .host
            .download_archive(&repo)
            .await
            .map_err(PipelineError::UpstreamUnavailable)?;
        let loader_config = self.config.loader.clone();
        // The extracted tree is removed once the records are in memory.
        let records = tokio::task::spawn_blocking(move || {
            let workdir = tempfile::TempDir::new().context("failed to create extraction directory")?;
            source::extract_archive(&archive, workdir.path())?;
            loader::load_snapshot(&archive_root(workdir.path())?, &loader_config)
        })
        .await
        .map_err(|e| PipelineError::Snapshot(e.into()))?
        .map_err(PipelineError::Snapshot)?;

        let diff = match req.diff.as_deref() {
            Some(d) => Some(d.to_string()),
            None if self.config.pipeline.include_diff => {
                match self.host.latest_diff(&repo, &commit).await {
                    Ok(d) => Some(d),
                    Err(e) => {
                        warn!("diff unavailable, continuing without it: {:#}", e);
                        None
                    }
                }
            }
            None => None,
        };

        let html = self
            .generate_document(
                records,
                diff.as_deref(),
                req.previous_html_content.as_deref(),
            )
            .await?;
        self.store(&commit, &html).await?;

        Ok(DocOutcome {
            html,
            title,
            cached: false,
            commit,
        })
    }

    /// Document an already-extracted tree.
    ///
    /// `key` replaces the commit hash as cache key; without one, a SHA-256
    /// over the loaded files is used.
    pub async fn run_local(&self, dir: &Path, key: Option<&str>) -> Result<DocOutcome, PipelineError> {
        let root = dir.to_path_buf();
        let loader_config = self.config.loader.clone();
        let records = tokio::task::spawn_blocking(move || loader::load_snapshot(&root, &loader_config))
            .await
            .map_err(|e| PipelineError::Snapshot(e.into()))?
            .map_err(PipelineError::Snapshot)?;
        let key = match key {
            Some(k) => k.to_string(),
            None => records_key(&records),
        };
        let name = dir
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| dir.display().to_string());
        let title = format!("Docs: {}", name);

        let span = info_span!("run", repo = %name, commit = %key);
        async {
            if let Some(html) = self.cached(&key).await? {
                return Ok(DocOutcome {
                    html,
                    title,
                    cached: true,
                    commit: key,
                });
            }
            let html = self.generate_document(records, None, None).await?;
            self.store(&key, &html).await?;
            Ok::<_, PipelineError>(DocOutcome {
                html,
                title,
                cached: false,
                commit: key,
            })
        }
        .instrument(span)
        .await
    }

    async fn cached(&self, key: &str) -> Result<Option<String>, PipelineError> {
        let hit = self.cache.get(key).await.map_err(PipelineError::Cache)?;
        if hit.is_some() {
            info!(cache = self.cache.name(), "cache hit, skipping generation");
        } else {
            debug!(cache = self.cache.name(), "cache miss");
        }
        Ok(hit)
    }

    async fn store(&self, key: &str, html: &str) -> Result<(), PipelineError> {
        self.cache.put(key, html).await.map_err(PipelineError::Cache)?;
        info!(cache = self.cache.name(), bytes = html.len(), "document cached");
        Ok(())
    }

    /// Map all files, then merge the summaries into one HTML document.
    pub async fn generate_document(
        &self,
        records: Vec<FileRecord>,
        diff: Option<&str>,
        previous: Option<&str>,
    ) -> Result<String, PipelineError> {
        if records.is_empty() {
            return Err(PipelineError::NoSourceFiles);
        }
        let cfg = &self.config.pipeline;
        let files = records.len();
        let chunks = chunk::partition(records, cfg.chunk_char_budget);
        info!(files, chunks = chunks.len(), "snapshot partitioned");

        let units: Vec<GenerationUnit> = chunks.into_iter().map(GenerationUnit::Chunk).collect();
        let mapped = fan_out(
            "map",
            units,
            cfg.map_worker_count,
            GenerationUnit::unit_id,
            |unit| self.generate_unit(unit, diff, previous),
        )
        .await;
        info!(
            completed = mapped.completed.len(),
            failed = mapped.failures.len(),
            "map phase finished"
        );
        if mapped.completed.is_empty() {
            return Err(PipelineError::NoSummaries {
                phase: "map",
                failed: mapped.failures.len(),
            });
        }

        let document = match cfg.merge_strategy {
            MergeStrategy::Sections => {
                let summaries: Arc<Vec<String>> = Arc::new(
                    merge::order_chunk_fragments(mapped.completed)
                        .into_iter()
                        .map(|f| f.html)
                        .collect(),
                );
                let units: Vec<GenerationUnit> = Section::ALL
                    .into_iter()
                    .map(|section| GenerationUnit::Section {
                        section,
                        summaries: Arc::clone(&summaries),
                    })
                    .collect();
                let sections = fan_out(
                    "section",
                    units,
                    cfg.section_worker_count,
                    GenerationUnit::unit_id,
                    |unit| self.generate_unit(unit, diff, previous),
                )
                .await;
                info!(
                    completed = sections.completed.len(),
                    failed = sections.failures.len(),
                    "section phase finished"
                );
                if sections.completed.is_empty() {
                    return Err(PipelineError::NoSummaries {
                        phase: "section",
                        failed: sections.failures.len(),
                    });
                }
                merge::stitch_sections(sections.completed)
            }
            MergeStrategy::Unify => {
                merge::unify(
                    &self.invoker,
                    mapped.completed,
                    previous,
                    cfg.section_max_tokens,
                    cfg.max_continuation_rounds,
                )
                .await?
            }
        };

        Ok(document.html)
    }

    async fn generate_unit(
        &self,
        unit: GenerationUnit,
        diff: Option<&str>,
        previous: Option<&str>,
    ) -> Result<Fragment, GenerationError> {
        let cfg = &self.config.pipeline;
        let (prompt, max_tokens) = match &unit {
            GenerationUnit::Chunk(chunk) => (prompts::map_prompt(chunk, diff), cfg.map_max_tokens),
            GenerationUnit::Section { section, summaries } => (
                prompts::section_prompt(*section, summaries, previous),
                cfg.section_max_tokens,
            ),
        };
        let unit_id = unit.unit_id();
        debug!(unit = %unit_id, prompt_chars = prompt.len(), "generating");
        generate_complete(
            &self.invoker,
            &unit_id,
            &prompt,
            max_tokens,
            cfg.max_continuation_rounds,
        )
        .await
    }
}

/// Directory to load from after extraction.
///
/// Host archives wrap the tree in one top-level directory
/// (`{workspace}-{repo}-{hash}/`); descend into it when that is all there is.
fn archive_root(dir: &Path) -> anyhow::Result<PathBuf> {
    let entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .collect::<Result<_, _>>()?;
    match entries.as_slice() {
        [only] if only.file_type()?.is_dir() => Ok(only.path()),
        _ => Ok(dir.to_path_buf()),
    }
}

/// Stable content hash of a loaded snapshot.
fn records_key(records: &[FileRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.path.as_bytes());
        hasher.update([0u8]);
        hasher.update(record.content.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
