//! Snapshot loader.
//!
//! Walks an extracted repository tree and returns the text files worth
//! documenting. Ignored directories are pruned before descent, so large
//! dependency trees like `node_modules` are never read.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::config::LoaderConfig;
use crate::models::FileRecord;

/// Load every documentable file under `root`.
///
/// A file is kept when its name ends with one of `config.extensions`, no
/// `exclude_globs` pattern matches its relative path, it decodes as UTF-8,
/// and it is not blank. Content is trimmed. Order is stable for a given
/// filesystem state (entries are sorted by file name at every level).
pub fn load_snapshot(root: &Path, config: &LoaderConfig) -> Result<Vec<FileRecord>> {
    if !root.is_dir() {
        bail!("Snapshot root does not exist: {}", root.display());
    }

    let exclude_set = build_globset(&config.exclude_globs)?;
    let ignore_dirs: Vec<String> = config
        .ignore_dirs
        .iter()
        .map(|d| d.to_lowercase())
        .collect();

    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_dir(e, &ignore_dirs));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if !config.extensions.iter().any(|ext| name.ends_with(ext.as_str())) {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }

        if let Some(record) = read_record(path, rel_str) {
            files.push(record);
        }
    }

    debug!(root = %root.display(), files = files.len(), "snapshot loaded");
    Ok(files)
}

fn is_ignored_dir(entry: &DirEntry, ignore_dirs: &[String]) -> bool {
    entry.file_type().is_dir()
        && ignore_dirs.contains(&entry.file_name().to_string_lossy().to_lowercase())
}

/// Read one file. Unreadable, non-UTF-8 and blank files yield `None`.
fn read_record(path: &Path, relative_path: String) -> Option<FileRecord> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            debug!(path = %relative_path, "skipping unreadable file: {}", e);
            return None;
        }
    };
    let text = match String::from_utf8(bytes) {
        Ok(t) => t,
        Err(_) => {
            debug!(path = %relative_path, "skipping non-UTF-8 file");
            return None;
        }
    };

    let content = text.trim();
    if content.is_empty() {
        return None;
    }

    Some(FileRecord {
        path: relative_path,
        content: content.to_string(),
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
