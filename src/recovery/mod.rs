// src/recovery/mod.rs

//! Crash detection and state recovery
//!
//! While a scan runs, its progress is persisted to
//! `state/current_scan.json` with write-temp, fsync, rename atomicity: at
//! any kill point the file either parses cleanly or does not exist. On the
//! next start, an incomplete state file means the previous run was
//! interrupted, and the user chooses between continuing fresh, safe mode,
//! and inspecting the crash log.
//!
//! Only this module touches `current_scan.json`, `crash.log`,
//! `recovery_state.json`, and the lock file.

mod lock;

pub use lock::ProcessLock;

use crate::db::paths;
use crate::redact::Redactor;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Persisted state of an in-flight scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanState {
    pub scan_id: i64,
    pub path: String,
    pub started_at: DateTime<Utc>,
    pub total_files: u64,
    pub processed_files: u64,
    pub completed: bool,
}

impl ScanState {
    pub fn progress_percent(&self) -> f64 {
        if self.total_files == 0 {
            return 0.0;
        }
        (self.processed_files as f64 / self.total_files as f64) * 100.0
    }
}

/// Owns the recovery state files under `state/`
pub struct RecoveryManager {
    current_scan: PathBuf,
    crash_log: PathBuf,
    recovery_state: PathBuf,
    state_dir: PathBuf,
    redactor: Redactor,
}

impl RecoveryManager {
    pub fn new(organizer_dir: &Path, redactor: Redactor) -> Result<Self> {
        let state_dir = paths::state_dir(organizer_dir);
        fs::create_dir_all(&state_dir)
            .map_err(|e| Error::fs("create state directory", state_dir.clone(), e))?;

        Ok(Self {
            current_scan: paths::current_scan(organizer_dir),
            crash_log: paths::crash_log(organizer_dir),
            recovery_state: paths::recovery_state(organizer_dir),
            state_dir,
            redactor,
        })
    }

    /// Record that a scan has started
    pub fn start_scan(&self, scan_id: i64, path: &Path, total_files: u64) -> Result<()> {
        let state = ScanState {
            scan_id,
            path: path.display().to_string(),
            started_at: Utc::now(),
            total_files,
            processed_files: 0,
            completed: false,
        };
        self.atomic_write(&self.current_scan, &serde_json::to_value(&state)?)?;
        debug!("Recorded scan start: {scan_id}");
        Ok(())
    }

    /// Update the processed-file count of the running scan
    pub fn update_progress(&self, processed_files: u64) -> Result<()> {
        let mut state = match self.read_state()? {
            Some(state) => state,
            None => return Ok(()),
        };
        state.processed_files = processed_files;
        self.atomic_write(&self.current_scan, &serde_json::to_value(&state)?)
    }

    /// The scan finished cleanly: drop the state file
    pub fn complete_scan(&self) -> Result<()> {
        if self.current_scan.exists() {
            fs::remove_file(&self.current_scan)
                .map_err(|e| Error::fs("clear scan state", self.current_scan.clone(), e))?;
            debug!("Cleared scan state");
        }
        Ok(())
    }

    /// Did the previous session leave an unfinished scan behind?
    ///
    /// A state file that no longer parses is archived as corrupt and still
    /// counts as a crash.
    pub fn detect_crash(&self) -> bool {
        if !self.current_scan.exists() {
            return false;
        }

        match self.read_state() {
            Ok(Some(state)) => {
                if !state.completed {
                    warn!(
                        "Detected incomplete scan #{} ({}/{} files)",
                        state.scan_id, state.processed_files, state.total_files
                    );
                    return true;
                }
                false
            }
            Ok(None) => false,
            Err(err) => {
                error!("Scan state file unreadable: {err}");
                self.archive_corrupt(&self.current_scan);
                true
            }
        }
    }

    /// The interrupted scan's state, if one exists
    pub fn interrupted_scan(&self) -> Option<ScanState> {
        self.read_state()
            .ok()
            .flatten()
            .filter(|state| !state.completed)
    }

    /// Append a crash entry; paths are redacted unless redaction is off
    pub fn record_crash(&self, err: &Error) {
        let mut entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "error_type": err.code(),
            "error_message": self.redactor.redact(&err.to_string()),
            "traceback": self.redactor.redact(&err.technical_details()),
        });

        if let Some(state) = self.interrupted_scan() {
            let mut state_value = serde_json::to_value(&state).unwrap_or_default();
            if let Some(path) = state_value.get_mut("path") {
                *path = json!(self.redactor.redact(&state.path));
            }
            entry["interrupted_scan"] = state_value;
        }

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.crash_log)
            .and_then(|mut file| writeln!(file, "{entry}"));
        match result {
            Ok(()) => info!("Recorded crash to {}", self.crash_log.display()),
            Err(err) => error!("Failed to record crash: {err}"),
        }
    }

    /// The most recent crash entries, oldest first
    pub fn crash_history(&self, limit: usize) -> Vec<serde_json::Value> {
        let file = match File::open(&self.crash_log) {
            Ok(file) => file,
            Err(_) => return Vec::new(),
        };

        let mut crashes: Vec<serde_json::Value> = BufReader::new(file)
            .lines()
            .map_while(|line| line.ok())
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect();

        if crashes.len() > limit {
            crashes.drain(..crashes.len() - limit);
        }
        crashes
    }

    /// Enter safe mode: suggester calls and executor writes stay disabled
    /// until the sentinel is removed
    pub fn enter_safe_mode(&self) -> Result<()> {
        self.atomic_write(
            &self.recovery_state,
            &json!({
                "mode": "safe_mode",
                "timestamp": Utc::now().to_rfc3339(),
            }),
        )?;
        info!("Entered safe mode");
        Ok(())
    }

    pub fn exit_safe_mode(&self) -> Result<()> {
        if self.recovery_state.exists() {
            fs::remove_file(&self.recovery_state)
                .map_err(|e| Error::fs("remove safe-mode sentinel", self.recovery_state.clone(), e))?;
            info!("Exited safe mode");
        }
        Ok(())
    }

    pub fn is_safe_mode(&self) -> bool {
        fs::read_to_string(&self.recovery_state)
            .ok()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
            .and_then(|value| value.get("mode").and_then(|m| m.as_str().map(String::from)))
            .is_some_and(|mode| mode == "safe_mode")
    }

    /// Human-readable account of an interrupted scan
    pub fn reconstruct_incident(&self, state: &ScanState) -> String {
        let mut lines = vec![
            "Incident Reconstruction".to_string(),
            "=".repeat(50),
            String::new(),
            format!("Scan ID: {}", state.scan_id),
            format!("Path: {}", self.redactor.redact(&state.path)),
            format!("Started: {}", state.started_at.to_rfc3339()),
            format!(
                "Progress: {}/{} files",
                state.processed_files, state.total_files
            ),
        ];

        if state.total_files > 0 {
            lines.push(format!("Completion: {:.1}%", state.progress_percent()));
        }

        if let Some(crash) = self.crash_history(1).into_iter().next() {
            lines.push(String::new());
            lines.push("Last Error:".to_string());
            lines.push(format!(
                "  Type: {}",
                crash.get("error_type").and_then(|v| v.as_str()).unwrap_or("Unknown")
            ));
            lines.push(format!(
                "  Message: {}",
                crash
                    .get("error_message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("No message")
            ));
            lines.push(format!(
                "  Time: {}",
                crash.get("timestamp").and_then(|v| v.as_str()).unwrap_or("Unknown")
            ));
        }

        lines.push(String::new());
        lines.push("Recovery Options:".to_string());
        lines.push("  1. Continue: discard the saved state and start fresh".to_string());
        lines.push("  2. Safe mode: disable suggester calls and executor writes".to_string());
        lines.push("  3. View crash details from state/crash.log".to_string());

        lines.join("\n")
    }

    fn read_state(&self) -> Result<Option<ScanState>> {
        let raw = match fs::read_to_string(&self.current_scan) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::fs("read scan state", self.current_scan.clone(), e)),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Write-temp, fsync file, fsync directory, rename over the target
    fn atomic_write(&self, target: &Path, value: &serde_json::Value) -> Result<()> {
        let mut temp = tempfile::NamedTempFile::new_in(&self.state_dir)
            .map_err(|e| Error::fs("create temp state file", self.state_dir.clone(), e))?;

        serde_json::to_writer_pretty(&mut temp, value)?;
        temp.as_file().sync_all()
            .map_err(|e| Error::fs("sync temp state file", temp.path().to_path_buf(), e))?;

        temp.persist(target)
            .map_err(|e| Error::fs("persist state file", target.to_path_buf(), e.error))?;

        if let Ok(dir) = File::open(&self.state_dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    fn archive_corrupt(&self, path: &Path) {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let archive = path.with_extension(format!("corrupt.{stamp}.json"));
        match fs::rename(path, &archive) {
            Ok(()) => info!("Archived corrupt state file to {}", archive.display()),
            Err(err) => error!("Failed to archive corrupt state file: {err}"),
        }
    }
}
