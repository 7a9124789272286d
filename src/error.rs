//! Error taxonomy of the generation pipeline.
//!
//! Failures are split by blast radius:
//!
//! | Type | Scope | Outcome |
//! |------|-------|---------|
//! | [`ModelError`] | one backend call | retried (throttling) or propagated |
//! | [`GenerationError`] | one generation unit | absorbed by the fan-out scheduler |
//! | [`PipelineError`] | the whole run | aborts, no partial document |
//!
//! Incomplete output after the continuation budget is not an error: the
//! fragment is accepted as-is. A cache miss is `Ok(None)`.

use thiserror::Error;

/// Failure modes of the LLM backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// The backend is saturated; the call may succeed if retried later.
    #[error("model backend throttled: {0}")]
    Throttled(String),

    #[error("model invocation failed: {0}")]
    InvocationFailed(String),
}

impl ModelError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, ModelError::Throttled(_))
    }
}

/// Failure of a single generation unit (chunk or section).
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("model produced no output for {unit}")]
    EmptyOutput { unit: String },
}

/// Failures that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source host (commit lookup, archive download) is unreachable or refused.
    #[error("source host unavailable: {0:#}")]
    UpstreamUnavailable(anyhow::Error),

    #[error("cache store failed: {0:#}")]
    Cache(anyhow::Error),

    #[error("failed to load snapshot: {0:#}")]
    Snapshot(anyhow::Error),

    #[error("snapshot contains no documentable source files")]
    NoSourceFiles,

    /// Every unit of a fan-out phase failed.
    #[error("all {failed} {phase} units failed; nothing to document")]
    NoSummaries { phase: &'static str, failed: usize },

    #[error("final document generation failed: {0}")]
    Generation(#[from] GenerationError),
}

impl PipelineError {
    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::UpstreamUnavailable(_) => "upstream_unavailable",
            PipelineError::Cache(_) => "cache_error",
            PipelineError::Snapshot(_) => "snapshot_error",
            PipelineError::NoSourceFiles => "no_source_files",
            PipelineError::NoSummaries { .. } => "generation_failed",
            PipelineError::Generation(_) => "generation_failed",
        }
    }
}
