// src/scan.rs

//! Directory scanning and per-file analysis
//!
//! Enumeration is a fast pass that discovers candidate paths; analysis runs
//! the Extractor, Categorizer, and RiskAssessor over each file on a rayon
//! pool bounded by CPU count. Analysis has no shared mutation, so per-file
//! work is embarrassingly parallel; results are joined in enumeration
//! order. A failing file is logged and skipped, never aborting the scan.

use crate::categorize::{Categories, Categorizer};
use crate::config::{Config, ORGANIZER_DIR_NAME};
use crate::extract::{DocType, Extracted, Extractor};
use crate::redact::Redactor;
use crate::risk::{RiskAssessor, RiskLevel};
use crate::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Files at or above this size skip content extraction
const EXTRACT_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// Everything the pipeline knows about one scanned file
///
/// Created once by the scanner and read-only afterwards; proposals freeze
/// lists of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path at scan time
    pub path: PathBuf,
    pub size: u64,
    /// Bounded text preview (may be empty)
    pub preview: String,
    pub metadata: BTreeMap<String, String>,
    pub doc_type: DocType,
    pub categories: Categories,
    pub risk_score: u8,
    /// Reasons in the order the assessor applied them
    pub risk_reasons: Vec<String>,
}

impl FileRecord {
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.risk_score)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Aggregate counts over a set of scanned files
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub total: usize,
    pub total_size: u64,
    pub by_type: BTreeMap<String, usize>,
    pub low_risk: usize,
    pub medium_risk: usize,
    pub high_risk: usize,
}

impl ScanStats {
    pub fn collect(files: &[FileRecord]) -> Self {
        let mut stats = Self {
            total: files.len(),
            ..Self::default()
        };
        for file in files {
            stats.total_size += file.size;
            *stats.by_type.entry(file.categories.kind.clone()).or_insert(0) += 1;
            match file.risk_level() {
                RiskLevel::Low => stats.low_risk += 1,
                RiskLevel::Medium => stats.medium_risk += 1,
                RiskLevel::High => stats.high_risk += 1,
            }
        }
        stats
    }
}

/// Scans a directory and produces `FileRecord`s
pub struct Scanner<'a> {
    extractor: &'a dyn Extractor,
    categorizer: &'a Categorizer,
    risk: &'a RiskAssessor,
    redactor: Redactor,
    ignore_hidden: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(
        config: &Config,
        extractor: &'a dyn Extractor,
        categorizer: &'a Categorizer,
        risk: &'a RiskAssessor,
    ) -> Self {
        Self {
            extractor,
            categorizer,
            risk,
            redactor: Redactor::new(
                config.get_bool("privacy.redact_sensitive_in_logs", true),
                crate::redact::DEFAULT_MIN_TOKEN_LENGTH,
            ),
            ignore_hidden: config.get_bool("preferences.ignore_hidden", true),
        }
    }

    /// Discover candidate files under `dir`
    ///
    /// Skips anything below a `.organizer` segment, hidden entries when
    /// configured, and non-files. Paths come back in traversal order, which
    /// fixes the order of everything downstream.
    pub fn enumerate(&self, dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        let meta = std::fs::metadata(dir)
            .map_err(|e| Error::fs("scan directory", dir.to_path_buf(), e))?;
        if !meta.is_dir() {
            return Err(Error::fs(
                "scan directory",
                dir.to_path_buf(),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let ignore_hidden = self.ignore_hidden;

        let mut paths = Vec::new();
        let walker = WalkDir::new(dir)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(move |entry| {
                let name = entry.file_name().to_string_lossy();
                if name == ORGANIZER_DIR_NAME {
                    return false;
                }
                // Never filter the scan root itself
                if entry.depth() == 0 {
                    return true;
                }
                !(ignore_hidden && name.starts_with('.'))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {err}");
                    continue;
                }
            };
            if entry.file_type().is_file() {
                paths.push(entry.into_path());
            }
        }

        Ok(paths)
    }

    /// Analyze the enumerated files in parallel
    ///
    /// `progress` is invoked with the number of files processed so far;
    /// calls arrive from worker threads. Files that fail to stat are
    /// skipped with a warning.
    pub fn analyze<F>(&self, paths: &[PathBuf], progress: F) -> Vec<FileRecord>
    where
        F: Fn(u64) + Sync,
    {
        let processed = AtomicU64::new(0);

        let mut records: Vec<(usize, FileRecord)> = paths
            .par_iter()
            .enumerate()
            .filter_map(|(index, path)| {
                let record = self.analyze_file(path);
                let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                progress(done);
                match record {
                    Ok(record) => Some((index, record)),
                    Err(err) => {
                        warn!(
                            "Error analyzing {}: {err}",
                            self.redactor.redact_path(path)
                        );
                        None
                    }
                }
            })
            .collect();

        records.sort_by_key(|(index, _)| *index);
        records.into_iter().map(|(_, record)| record).collect()
    }

    /// Enumerate and analyze in one step, without progress reporting
    pub fn scan(&self, dir: &Path, recursive: bool) -> Result<Vec<FileRecord>> {
        let paths = self.enumerate(dir, recursive)?;
        Ok(self.analyze(&paths, |_| {}))
    }

    fn analyze_file(&self, path: &Path) -> Result<FileRecord> {
        let meta = std::fs::metadata(path)
            .map_err(|e| Error::fs("stat file", path.to_path_buf(), e))?;
        let size = meta.len();
        let mtime = meta.modified().ok();

        let extracted = if size < EXTRACT_MAX_BYTES {
            self.extractor.extract(path)
        } else {
            debug!("Skipping extraction for large file ({size} bytes)");
            Extracted::default()
        };

        let categories = self
            .categorizer
            .categorize(path, &extracted.preview, mtime);
        let (risk_score, risk_reasons) =
            self.risk.assess(path, &extracted.preview, size, mtime);

        Ok(FileRecord {
            path: path.to_path_buf(),
            size,
            preview: extracted.preview,
            metadata: extracted.metadata,
            doc_type: extracted.doc_type,
            categories,
            risk_score,
            risk_reasons,
        })
    }
}
