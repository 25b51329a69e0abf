// src/db/paths.rs
//! Centralized path derivation for the organizer directory

use std::path::{Path, PathBuf};

/// Relational audit store
pub fn audit_db(organizer_dir: &Path) -> PathBuf {
    organizer_dir.join("audit.db")
}

/// Append-only transition stream
pub fn audit_jsonl(organizer_dir: &Path) -> PathBuf {
    organizer_dir.join("audit.jsonl")
}

/// Human-readable operations log
pub fn operations_log(organizer_dir: &Path) -> PathBuf {
    organizer_dir.join("operations.log")
}

/// Recovery state directory
pub fn state_dir(organizer_dir: &Path) -> PathBuf {
    organizer_dir.join("state")
}

/// Atomically-persisted in-flight scan state
pub fn current_scan(organizer_dir: &Path) -> PathBuf {
    state_dir(organizer_dir).join("current_scan.json")
}

/// Crash log (JSON lines)
pub fn crash_log(organizer_dir: &Path) -> PathBuf {
    state_dir(organizer_dir).join("crash.log")
}

/// Safe-mode sentinel
pub fn recovery_state(organizer_dir: &Path) -> PathBuf {
    state_dir(organizer_dir).join("recovery_state.json")
}

/// Process lock file (holds owner PID)
pub fn lock_file(organizer_dir: &Path) -> PathBuf {
    organizer_dir.join("organizer.lock")
}

/// Root of the per-proposal backup store
pub fn backups_dir(organizer_dir: &Path) -> PathBuf {
    organizer_dir.join("backups")
}

/// Backup directory for one proposal
pub fn backup_dir(organizer_dir: &Path, proposal_id: i64) -> PathBuf {
    backups_dir(organizer_dir).join(proposal_id.to_string())
}
