//! Corpus loader: walks the configured directories, extracts text from every
//! supported file and chunks it.
//!
//! Extraction failures never abort a load. The offending file is logged,
//! recorded in the [`LoadReport`], and skipped.

use anyhow::Result;
use chrono::NaiveDate;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::extract::{extract_file, FileKind};
use crate::models::{DocumentChunk, DATE_FORMAT};

/// Inputs for one corpus load, decoupled from the full application config.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub directories: Vec<PathBuf>,
    /// Directory whose files naming `today` are excluded.
    pub history_dir: PathBuf,
    pub exclude_globs: Vec<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub today: NaiveDate,
}

impl LoadOptions {
    pub fn from_config(config: &Config, today: NaiveDate) -> Self {
        Self {
            directories: config.paths.documents_dirs.clone(),
            history_dir: config.paths.history_dir.clone(),
            exclude_globs: config.corpus.exclude_globs.clone(),
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            today,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// `(file name, chunks produced)` for every file that was read.
    pub files: Vec<(String, usize)>,
    /// `(file name, reason)` for every supported file that was skipped.
    pub skipped: Vec<(String, String)>,
}

impl LoadReport {
    pub fn chunk_count(&self) -> usize {
        self.files.iter().map(|(_, n)| n).sum()
    }
}

/// Load and chunk every supported file under `opts.directories`.
///
/// Directories are read non-recursively and files are visited in name
/// order, so the corpus order is deterministic across runs.
pub fn load_documents(opts: &LoadOptions) -> Result<(Vec<DocumentChunk>, LoadReport)> {
    let exclude_set = build_globset(&opts.exclude_globs)?;
    let today_tag = opts.today.format(DATE_FORMAT).to_string();

    let mut chunks = Vec::new();
    let mut report = LoadReport::default();

    for dir in &opts.directories {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "corpus directory missing, skipping");
            continue;
        }
        let is_history = same_dir(dir, &opts.history_dir);

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "failed to read directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let filename = entry.file_name().to_string_lossy().to_string();

            if FileKind::from_path(path).is_none() {
                continue;
            }
            if exclude_set.is_match(&filename) {
                debug!(file = %filename, "excluded by glob");
                continue;
            }
            // A same-day history file is still being written by this process.
            if is_history && filename.contains(&today_tag) {
                debug!(file = %filename, "skipping same-day history file");
                continue;
            }

            match extract_file(path) {
                Ok(texts) => {
                    let before = chunks.len();
                    for text in texts {
                        chunks.extend(chunk_text(
                            &text,
                            &filename,
                            opts.chunk_size,
                            opts.chunk_overlap,
                        ));
                    }
                    report.files.push((filename, chunks.len() - before));
                }
                Err(e) => {
                    warn!(file = %filename, error = %e, "skipping file");
                    report.skipped.push((filename, e.to_string()));
                }
            }
        }
    }

    if chunks.is_empty() {
        warn!("no documents were successfully processed; answers will have no context");
    } else {
        info!(
            files = report.files.len(),
            chunks = chunks.len(),
            "corpus loaded"
        );
    }

    Ok((chunks, report))
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
