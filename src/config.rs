//! TOML configuration for the documentation pipeline.
//!
//! Every section is optional; an empty file (or [`Config::default`]) yields a
//! working configuration that reads from Bitbucket, calls Bedrock and caches
//! into a local directory.
//!
//! ```toml
//! [pipeline]
//! chunk_char_budget = 100000
//! map_worker_count = 10
//! section_worker_count = 7
//! max_continuation_rounds = 3
//! max_backoff_attempts = 6
//! merge_strategy = "sections"
//!
//! [model]
//! provider = "bedrock"
//! model_id = "anthropic.claude-3-5-sonnet-20240620-v1:0"
//! region = "us-east-1"
//!
//! [cache]
//! backend = "s3"
//! bucket = "autodoc-archive"
//! region = "us-east-1"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::merge::MergeStrategy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Knobs shared by every pipeline run.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_chunk_char_budget")]
    pub chunk_char_budget: usize,
    #[serde(default = "default_map_worker_count")]
    pub map_worker_count: usize,
    #[serde(default = "default_section_worker_count")]
    pub section_worker_count: usize,
    #[serde(default = "default_max_continuation_rounds")]
    pub max_continuation_rounds: usize,
    #[serde(default = "default_max_backoff_attempts")]
    pub max_backoff_attempts: u32,
    /// Base delay of the throttling backoff, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_map_max_tokens")]
    pub map_max_tokens: u32,
    #[serde(default = "default_section_max_tokens")]
    pub section_max_tokens: u32,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    /// Fetch the latest diff from the source host when the request carries none.
    #[serde(default = "default_true")]
    pub include_diff: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_char_budget: default_chunk_char_budget(),
            map_worker_count: default_map_worker_count(),
            section_worker_count: default_section_worker_count(),
            max_continuation_rounds: default_max_continuation_rounds(),
            max_backoff_attempts: default_max_backoff_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            map_max_tokens: default_map_max_tokens(),
            section_max_tokens: default_section_max_tokens(),
            merge_strategy: MergeStrategy::default(),
            include_diff: true,
        }
    }
}

fn default_chunk_char_budget() -> usize {
    100_000
}
fn default_map_worker_count() -> usize {
    10
}
fn default_section_worker_count() -> usize {
    7
}
fn default_max_continuation_rounds() -> usize {
    3
}
fn default_max_backoff_attempts() -> u32 {
    6
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_map_max_tokens() -> u32 {
    4000
}
fn default_section_max_tokens() -> u32 {
    8000
}
fn default_true() -> bool {
    true
}

/// Which files of the snapshot are read.
#[derive(Debug, Deserialize, Clone)]
pub struct LoaderConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Directory names pruned during the walk, compared case-insensitively.
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,
    /// Extra glob patterns matched against relative paths.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignore_dirs: default_ignore_dirs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    [
        ".md",
        ".yaml",
        ".yml",
        ".json",
        ".py",
        ".java",
        ".ts",
        ".js",
        ".tf",
        ".sh",
        ".tsx",
        ".properties",
        ".go",
        ".cs",
        ".xml",
        ".gradle",
        ".sql",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ignore_dirs() -> Vec<String> {
    [
        "node_modules",
        "venv",
        ".git",
        "dist",
        "build",
        "target",
        "__pycache__",
        "tests",
        "test",
        "bin",
        "obj",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Overrides the provider's default endpoint (proxies, local fakes).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            region: default_region(),
            endpoint_url: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_model_timeout_secs(),
            temperature: 0.0,
        }
    }
}

fn default_provider() -> String {
    "bedrock".to_string()
}
fn default_model_id() -> String {
    "anthropic.claude-3-5-sonnet-20240620-v1:0".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_model_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_backend")]
    pub backend: String,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// S3 backend only.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_cache_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            bucket: None,
            region: default_region(),
            endpoint_url: None,
            dir: default_cache_dir(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_cache_timeout_secs(),
        }
    }
}

fn default_cache_timeout_secs() -> u64 {
    60
}

fn default_cache_backend() -> String {
    "filesystem".to_string()
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("./data/cache")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_archive_base")]
    pub archive_base: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_commit_timeout_secs")]
    pub commit_timeout_secs: u64,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            archive_base: default_archive_base(),
            branch: default_branch(),
            commit_timeout_secs: default_commit_timeout_secs(),
            timeout_secs: default_source_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.bitbucket.org/2.0/repositories".to_string()
}
fn default_archive_base() -> String {
    "https://bitbucket.org".to_string()
}
fn default_branch() -> String {
    "master".to_string()
}
fn default_commit_timeout_secs() -> u64 {
    15
}
fn default_source_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Load the configuration file, or defaults when `path` does not exist.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        let mut config = Config::default();
        apply_env_overrides(&mut config);
        validate(&config)?;
        Ok(config)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    apply_env_overrides(&mut config);
    validate(&config)?;

    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(bucket) = std::env::var("AUTODOC_CACHE_BUCKET") {
        if !bucket.trim().is_empty() {
            config.cache.bucket = Some(bucket);
        }
    }
}

pub fn validate(config: &Config) -> Result<()> {
    let p = &config.pipeline;
    if p.chunk_char_budget == 0 {
        bail!("pipeline.chunk_char_budget must be > 0");
    }
    if p.map_worker_count == 0 {
        bail!("pipeline.map_worker_count must be > 0");
    }
    if p.section_worker_count == 0 {
        bail!("pipeline.section_worker_count must be > 0");
    }
    if p.max_backoff_attempts == 0 {
        bail!("pipeline.max_backoff_attempts must be >= 1");
    }
    if p.map_max_tokens == 0 || p.section_max_tokens == 0 {
        bail!("pipeline max token limits must be > 0");
    }

    if config.loader.extensions.is_empty() {
        bail!("loader.extensions must not be empty");
    }

    match config.model.provider.as_str() {
        "bedrock" | "anthropic" => {}
        other => bail!(
            "Unknown model provider: '{}'. Must be bedrock or anthropic.",
            other
        ),
    }
    if config.model.model_id.trim().is_empty() {
        bail!("model.model_id must not be empty");
    }

    match config.cache.backend.as_str() {
        "s3" => {
            if config.cache.bucket.as_deref().map_or(true, str::is_empty) {
                bail!("cache.bucket must be set when cache.backend is 's3'");
            }
        }
        "filesystem" => {
            if config.cache.dir.as_os_str().is_empty() {
                bail!("cache.dir must be set when cache.backend is 'filesystem'");
            }
        }
        "memory" => {}
        other => bail!(
            "Unknown cache backend: '{}'. Must be s3, filesystem, or memory.",
            other
        ),
    }

    Ok(())
}
