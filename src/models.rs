//! Core data models of the documentation pipeline.
//!
//! These types represent the files, chunks, generation units and fragments
//! that flow from the snapshot loader to the final merged document, plus the
//! request/response shapes of the process entry point.

use serde::{Deserialize, Serialize};

/// A text file read from the snapshot. Content is never blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Path relative to the snapshot root, `/`-separated.
    pub path: String,
    pub content: String,
}

impl FileRecord {
    /// Size in characters, the unit of the chunk budget.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// A bounded group of whole files submitted as one unit of map work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub files: Vec<FileRecord>,
    /// Total characters over `files`.
    pub char_size: usize,
}

impl Chunk {
    pub fn unit_id(&self) -> String {
        format!("chunk-{}", self.index)
    }
}

/// Named sections of the final document, in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    Header,
    Apis,
    Dao,
    Security,
    Observability,
    Setup,
    Recommendations,
}

impl Section {
    pub const ALL: [Section; 7] = [
        Section::Header,
        Section::Apis,
        Section::Dao,
        Section::Security,
        Section::Observability,
        Section::Setup,
        Section::Recommendations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Header => "header",
            Section::Apis => "apis",
            Section::Dao => "dao",
            Section::Security => "security",
            Section::Observability => "observability",
            Section::Setup => "setup",
            Section::Recommendations => "recommendations",
        }
    }

    pub fn from_unit_id(id: &str) -> Option<Section> {
        let name = id.strip_prefix("section-")?;
        Section::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

/// Input of one model round. Exactly one fragment is produced per unit.
#[derive(Debug, Clone)]
pub enum GenerationUnit {
    /// Map phase: extract facts from one chunk.
    Chunk(Chunk),
    /// Section phase: write one section from all map-phase summaries.
    Section {
        section: Section,
        summaries: std::sync::Arc<Vec<String>>,
    },
}

impl GenerationUnit {
    pub fn unit_id(&self) -> String {
        match self {
            GenerationUnit::Chunk(chunk) => chunk.unit_id(),
            GenerationUnit::Section { section, .. } => format!("section-{}", section.as_str()),
        }
    }
}

/// One unit's HTML output after completion repair and sanitizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub unit_id: String,
    pub html: String,
}

/// A cached document, keyed by the commit it was generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub commit_hash: String,
    pub html: String,
    pub content_type: &'static str,
}

impl CacheEntry {
    pub const CONTENT_TYPE: &'static str = "text/html";

    pub fn new(commit_hash: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            commit_hash: commit_hash.into(),
            html: html.into(),
            content_type: Self::CONTENT_TYPE,
        }
    }

    /// Object key under which a commit's document is stored.
    pub fn object_key(commit_hash: &str) -> String {
        format!("{}.html", commit_hash)
    }
}

/// Request payload of the process entry point.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocRequest {
    pub repo_name: String,
    pub workspace_name: String,
    #[serde(alias = "username")]
    pub org_admin_email: String,
    #[serde(alias = "bitbucketToken")]
    pub access_token: String,
    /// Diff of the latest merge; fetched from the source host when absent.
    #[serde(default)]
    pub diff: Option<String>,
    /// Existing documentation the sections should stay consistent with.
    #[serde(default)]
    pub previous_html_content: Option<String>,
}

/// Successful response of the process entry point.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocResponse {
    pub status_code: u16,
    pub html_content: String,
    pub title: String,
    pub cached: bool,
}
