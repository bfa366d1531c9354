//! Upload surface for the terminal.
//!
//! Files arrive from `--file` arguments and from a polled drop directory.
//! Both go through [`is_accepted`]; rejected files never reach the console.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::models::{UploadedFile, IMAGE_MARKER, MIME_OCTET_STREAM, MIME_PDF, MIME_TEXT};

/// Hidden files and the usual partial-download suffixes.
const DEFAULT_EXCLUDES: &[&str] = &["**/.*", "**/*.part", "**/*.crdownload", "**/*.tmp"];

/// Accept iff the declared type is an image, PDF or plain text, or the name
/// has one of the known suffixes. Suffixes are case-sensitive.
pub fn is_accepted(name: &str, mime: &str) -> bool {
    if mime.contains(IMAGE_MARKER) || mime == MIME_PDF || mime == MIME_TEXT {
        return true;
    }
    [".txt", ".pdf", ".png", ".jpg", ".jpeg"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

/// Declared type for a path, from its extension (any case).
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => MIME_PDF,
        Some("txt") => MIME_TEXT,
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => MIME_OCTET_STREAM,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Reads a file from disk into an [`UploadedFile`].
pub async fn read_file(path: &Path) -> Result<UploadedFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(UploadedFile::new(file_name(path), mime_for_path(path), bytes))
}

/// Drops the files the predicate rejects, keeping the order of the rest.
pub fn accept_batch(batch: Vec<UploadedFile>) -> Vec<UploadedFile> {
    batch
        .into_iter()
        .filter(|f| {
            let ok = is_accepted(&f.name, &f.mime);
            if !ok {
                tracing::debug!(file = %f.name, mime = %f.mime, "rejected upload");
            }
            ok
        })
        .collect()
}

/// Reads every `--file` path. A path that can't be read is an error; a
/// path the predicate rejects is dropped.
pub async fn read_paths(paths: &[PathBuf]) -> Result<Vec<UploadedFile>> {
    let mut batch = Vec::with_capacity(paths.len());
    for path in paths {
        batch.push(read_file(path).await?);
    }
    Ok(accept_batch(batch))
}

/// Size and mtime of a dropped file as of the last scan.
type Stamp = (u64, Option<SystemTime>);

/// A directory polled for new uploads. Each path is offered at most once,
/// and only after two consecutive scans saw the same size and mtime.
#[derive(Debug)]
pub struct DropDirectory {
    root: PathBuf,
    exclude: GlobSet,
    seen: HashSet<PathBuf>,
    pending: HashMap<PathBuf, Stamp>,
}

impl DropDirectory {
    pub fn new(root: impl Into<PathBuf>, exclude_globs: &[String]) -> Result<Self> {
        let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        patterns.extend(exclude_globs.iter().cloned());
        Ok(Self {
            root: root.into(),
            exclude: build_globset(&patterns)?,
            seen: HashSet::new(),
            pending: HashMap::new(),
        })
    }

    /// Collects files that have settled since the last scan, sorted by path.
    ///
    /// A file still being written changes size or mtime between scans and
    /// is held back until it stops changing. A missing root yields nothing,
    /// so the directory can be created after the console starts. Unreadable
    /// entries are logged and retried on the next scan.
    pub fn scan(&mut self) -> Vec<UploadedFile> {
        if !self.root.is_dir() {
            self.pending.clear();
            return Vec::new();
        }

        let mut pending = HashMap::new();
        let mut fresh = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping drop dir entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if self.seen.contains(path) {
                continue;
            }
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            if self.exclude.is_match(relative) {
                continue;
            }

            let stamp = match entry.metadata() {
                Ok(meta) => (meta.len(), meta.modified().ok()),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping drop dir entry");
                    continue;
                }
            };
            if self.pending.get(path) != Some(&stamp) {
                pending.insert(path.to_path_buf(), stamp);
                continue;
            }

            match std::fs::read(path) {
                Ok(bytes) => {
                    self.seen.insert(path.to_path_buf());
                    fresh.push(UploadedFile::new(file_name(path), mime_for_path(path), bytes));
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read dropped file");
                    pending.insert(path.to_path_buf(), stamp);
                }
            }
        }

        self.pending = pending;
        accept_batch(fresh)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
