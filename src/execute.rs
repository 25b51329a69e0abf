// src/execute.rs

//! Proposal execution
//!
//! Per file, in proposal order: backup, create destination parent, move,
//! append the Move row. A failure at any step after the backup removes the
//! backup and any partial destination before moving on, so the on-disk
//! state and the audit stay consistent file by file. The loop is not
//! suspendable mid-file: cancellation (SIGINT) is only observed between
//! files, and already-moved files keep their rows.
//!
//! Cross-device moves fall back to copy + verify + delete: the destination
//! hash must match the source before the source is removed.

use crate::audit::AuditStore;
use crate::config::Config;
use crate::db::models::ProposalRow;
use crate::db::paths;
use crate::hash;
use crate::plan::Proposal;
use crate::{Error, Result};
use filetime::FileTime;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Result of executing one proposal
#[derive(Debug, Default)]
pub struct ExecuteOutcome {
    /// Files listed in the proposal
    pub attempted: usize,
    /// Files that completed through their Move row
    pub files_moved: usize,
    /// True only when every listed file moved
    pub success: bool,
    /// True when this was a dry run (nothing touched)
    pub dry_run: bool,
    /// True when a cancel request stopped the batch between files
    pub cancelled: bool,
    /// Per-file failures, in proposal order
    pub failures: Vec<(PathBuf, Error)>,
}

/// Executes persisted proposals under transaction discipline
pub struct Executor<'a> {
    audit: &'a mut AuditStore,
    organizer_dir: PathBuf,
    backup_enabled: bool,
    skip_large_bytes: u64,
    retention: Duration,
    dry_run: bool,
    safe_mode: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Executor<'a> {
    pub fn new(audit: &'a mut AuditStore, organizer_dir: PathBuf, config: &Config) -> Self {
        Self {
            audit,
            organizer_dir,
            backup_enabled: config.get_bool("backup.enabled", true),
            skip_large_bytes: config.get_u64("backup.skip_large_files_mb", 500) * 1024 * 1024,
            retention: Duration::from_secs(
                config.get_u64("backup.retention_days", 30) * 24 * 60 * 60,
            ),
            dry_run: config.get_bool("preferences.dry_run", false),
            safe_mode: false,
            cancel: None,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = self.dry_run || dry_run;
        self
    }

    pub fn with_safe_mode(mut self, safe_mode: bool) -> Self {
        self.safe_mode = safe_mode;
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    /// Execute a persisted, approved proposal
    pub fn execute(&mut self, proposal: &Proposal) -> Result<ExecuteOutcome> {
        if self.safe_mode {
            return Err(Error::Config {
                key: "safe_mode".to_string(),
                issue: "executor writes are disabled in safe mode".to_string(),
            });
        }

        let proposal_id = proposal.id().ok_or_else(|| {
            Error::audit(
                "execute proposal",
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "proposal was never persisted",
                ),
            )
        })?;

        let row = ProposalRow::find_by_id(self.audit.connection(), proposal_id)?
            .ok_or_else(|| {
                Error::audit(
                    "execute proposal",
                    rusqlite::Error::QueryReturnedNoRows,
                )
            })?;
        if !row.approved {
            return Err(Error::audit(
                "execute proposal",
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "proposal is not approved",
                ),
            ));
        }

        let attempted = proposal.files().len();

        if self.dry_run {
            info!("DRY RUN: would move {attempted} file(s)");
            return Ok(ExecuteOutcome {
                attempted,
                dry_run: true,
                success: true,
                ..ExecuteOutcome::default()
            });
        }

        // Snapshot the backup decision on the proposal, then make the
        // approval durable before the first file changes
        self.audit.record_backup_mode(proposal_id, self.backup_enabled)?;
        self.audit.sync()?;

        let backup_dir = paths::backup_dir(&self.organizer_dir, proposal_id);
        let mut outcome = ExecuteOutcome {
            attempted,
            ..ExecuteOutcome::default()
        };

        for planned in proposal.files() {
            if self.is_cancelled() {
                warn!("Cancelled between files; stopping batch");
                outcome.cancelled = true;
                break;
            }

            match self.execute_one(proposal_id, &planned.source, &planned.destination, &backup_dir)
            {
                Ok(()) => outcome.files_moved += 1,
                Err(err @ (Error::Audit { .. } | Error::Sql(_))) => {
                    // Audit store failure: no further moves may be attempted
                    self.audit
                        .record_execute(proposal_id, outcome.files_moved, false)
                        .ok();
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        "Failed to move {}: {err}",
                        planned.source.display()
                    );
                    outcome.failures.push((planned.source.clone(), err));
                }
            }
        }

        outcome.success = outcome.files_moved == attempted && !outcome.cancelled;
        self.audit
            .record_execute(proposal_id, outcome.files_moved, outcome.success)?;

        if outcome.success {
            self.prune_backups();
        }

        Ok(outcome)
    }

    /// One file's backup → move → audit row sequence
    fn execute_one(
        &mut self,
        proposal_id: i64,
        source: &Path,
        destination: &Path,
        backup_dir: &Path,
    ) -> Result<()> {
        let meta = fs::symlink_metadata(source)
            .map_err(|e| Error::fs("stat source", source.to_path_buf(), e))?;
        let size = meta.len();

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::fs("create destination directory", parent.to_path_buf(), e))?;
        }

        let backup_path = if self.backup_enabled && size < self.skip_large_bytes {
            Some(self.backup_file(source, backup_dir)?)
        } else {
            // Metadata-only: rollback for this file is best-effort
            debug!(
                "No physical backup for {} ({} bytes)",
                source.display(),
                size
            );
            None
        };

        if let Err(err) = move_file(source, destination) {
            if let Some(backup) = &backup_path {
                let _ = fs::remove_file(backup);
            }
            return Err(err);
        }

        // The move row must land; if it cannot, undo the move so no file is
        // on disk without its audit row
        if let Err(err) = self.audit.record_move(proposal_id, source, destination) {
            warn!("Audit row failed after move; restoring {}", source.display());
            let _ = fs::rename(destination, source);
            if let Some(backup) = &backup_path {
                let _ = fs::remove_file(backup);
            }
            return Err(err);
        }

        debug!("Moved {} -> {}", source.display(), destination.display());
        Ok(())
    }

    /// Copy `source` into the proposal's backup directory, preserving the
    /// modification time. Name collisions get a timestamp suffix.
    fn backup_file(&self, source: &Path, backup_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(backup_dir)
            .map_err(|e| Error::fs("create backup directory", backup_dir.to_path_buf(), e))?;

        let name = source
            .file_name()
            .ok_or_else(|| {
                Error::fs(
                    "backup file",
                    source.to_path_buf(),
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
                )
            })?
            .to_string_lossy()
            .into_owned();

        let mut backup_path = backup_dir.join(&name);
        if backup_path.exists() {
            let stamp = chrono::Local::now().format("%Y%m%d%H%M%S%3f");
            backup_path = backup_dir.join(format!("{name}.{stamp}"));
        }

        fs::copy(source, &backup_path)
            .map_err(|e| Error::fs("backup file", source.to_path_buf(), e))?;

        let meta = fs::metadata(source)
            .map_err(|e| Error::fs("stat source", source.to_path_buf(), e))?;
        let mtime = FileTime::from_last_modification_time(&meta);
        let _ = filetime::set_file_mtime(&backup_path, mtime);

        debug!("Backed up {} -> {}", source.display(), backup_path.display());
        Ok(backup_path)
    }

    /// Remove per-proposal backup directories past the retention window
    fn prune_backups(&self) {
        let root = paths::backups_dir(&self.organizer_dir);
        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        let cutoff = SystemTime::now() - self.retention;

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let expired = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|mtime| mtime < cutoff)
                .unwrap_or(false);
            if expired {
                info!("Pruning expired backup directory {}", path.display());
                if let Err(err) = fs::remove_dir_all(&path) {
                    warn!("Failed to prune {}: {err}", path.display());
                }
            }
        }
    }
}

/// Move a file, falling back to copy + verify + delete across devices
pub fn move_file(source: &Path, destination: &Path) -> Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            debug!(
                "Cross-device move detected ({} -> {}), using copy fallback",
                source.display(),
                destination.display()
            );
            copy_verify_delete(source, destination)
        }
        Err(e) => Err(Error::fs("move file", source.to_path_buf(), e)),
    }
}

fn copy_verify_delete(source: &Path, destination: &Path) -> Result<()> {
    let result = (|| -> Result<()> {
        let source_hash = hash::sha256_file(source)
            .map_err(|e| Error::fs("hash source", source.to_path_buf(), e))?;

        fs::copy(source, destination)
            .map_err(|e| Error::fs("copy file", source.to_path_buf(), e))?;

        let file = File::open(destination)
            .map_err(|e| Error::fs("open destination", destination.to_path_buf(), e))?;
        file.sync_all()
            .map_err(|e| Error::fs("sync destination", destination.to_path_buf(), e))?;
        drop(file);

        // Not every filesystem supports directory fsync
        if let Some(parent) = destination.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        let destination_hash = hash::sha256_file(destination)
            .map_err(|e| Error::fs("hash destination", destination.to_path_buf(), e))?;
        if source_hash != destination_hash {
            return Err(Error::fs(
                "verify copy",
                destination.to_path_buf(),
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "destination hash does not match source",
                ),
            ));
        }

        fs::remove_file(source).map_err(|e| Error::fs("remove source", source.to_path_buf(), e))
    })();

    if result.is_err() {
        // Never leave a partial destination behind
        let _ = fs::remove_file(destination);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::Categorizer;
    use crate::plan::Planner;
    use crate::redact::Redactor;
    use crate::scan::Scanner;
    use crate::risk::RiskAssessor;
    use crate::extract::TextExtractor;
    use serde_json::json;
    use tempfile::TempDir;

    struct Env {
        organizer: TempDir,
        inbox: TempDir,
        base: TempDir,
        config: Config,
    }

    impl Env {
        fn new() -> Self {
            Self {
                organizer: TempDir::new().unwrap(),
                inbox: TempDir::new().unwrap(),
                base: TempDir::new().unwrap(),
                config: Config::defaults(),
            }
        }

        fn audit(&self) -> AuditStore {
            AuditStore::open(self.organizer.path(), Redactor::disabled()).unwrap()
        }

        fn propose(&self, audit: &mut AuditStore, approve: bool) -> Proposal {
            let categorizer = Categorizer::from_config(&self.config);
            let risk = RiskAssessor::new(Redactor::default());
            let extractor = TextExtractor;
            let scanner = Scanner::new(&self.config, &extractor, &categorizer, &risk);
            let files = scanner.scan(self.inbox.path(), false).unwrap();

            let scan_id = audit.record_scan(self.inbox.path(), files.len()).unwrap();
            let planner = Planner::new(&categorizer);
            let (mut proposal, _) = planner.plan(scan_id, &files, self.base.path());
            audit.record_propose(&mut proposal).unwrap();
            if approve {
                audit.record_approval(proposal.id().unwrap(), true).unwrap();
            }
            proposal
        }
    }

    #[test]
    fn test_execute_moves_files_and_writes_rows() {
        let env = Env::new();
        std::fs::write(env.inbox.path().join("report.pdf"), b"contents").unwrap();

        let mut audit = env.audit();
        let proposal = env.propose(&mut audit, true);
        let pid = proposal.id().unwrap();

        let outcome = Executor::new(&mut audit, env.organizer.path().to_path_buf(), &env.config)
            .execute(&proposal)
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.files_moved, 1);
        assert!(!env.inbox.path().join("report.pdf").exists());
        assert!(env.base.path().join("Documents/report.pdf").exists());

        let moves =
            crate::db::models::MoveRow::find_by_proposal(audit.connection(), pid).unwrap();
        assert_eq!(moves.len(), 1);

        // Physical backup exists for a small file
        let backup = paths::backup_dir(env.organizer.path(), pid).join("report.pdf");
        assert!(backup.exists());
        assert_eq!(std::fs::read(backup).unwrap(), b"contents");
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let env = Env::new();
        std::fs::write(env.inbox.path().join("a.txt"), b"x").unwrap();

        let mut audit = env.audit();
        let proposal = env.propose(&mut audit, true);
        let pid = proposal.id().unwrap();

        let outcome = Executor::new(&mut audit, env.organizer.path().to_path_buf(), &env.config)
            .with_dry_run(true)
            .execute(&proposal)
            .unwrap();

        assert!(outcome.dry_run);
        assert_eq!(outcome.attempted, 1);
        assert_eq!(outcome.files_moved, 0);
        assert!(env.inbox.path().join("a.txt").exists());
        assert!(
            crate::db::models::MoveRow::find_by_proposal(audit.connection(), pid)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_unapproved_proposal_is_refused() {
        let env = Env::new();
        std::fs::write(env.inbox.path().join("a.txt"), b"x").unwrap();

        let mut audit = env.audit();
        let proposal = env.propose(&mut audit, false);

        let err = Executor::new(&mut audit, env.organizer.path().to_path_buf(), &env.config)
            .execute(&proposal)
            .unwrap_err();
        assert_eq!(err.code(), "E006");
        assert!(env.inbox.path().join("a.txt").exists());
    }

    #[test]
    fn test_missing_source_is_per_file_failure() {
        let env = Env::new();
        std::fs::write(env.inbox.path().join("keep.txt"), b"x").unwrap();
        std::fs::write(env.inbox.path().join("gone.txt"), b"y").unwrap();

        let mut audit = env.audit();
        let proposal = env.propose(&mut audit, true);

        // One source disappears between planning and execution
        std::fs::remove_file(env.inbox.path().join("gone.txt")).unwrap();

        let outcome = Executor::new(&mut audit, env.organizer.path().to_path_buf(), &env.config)
            .execute(&proposal)
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.files_moved, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].1.code(), "E003");
        assert!(env.base.path().join("Documents/keep.txt").exists());
    }

    #[test]
    fn test_large_files_skip_physical_backup() {
        let mut env = Env::new();
        env.config = {
            let temp = env.organizer.path().join("config.json");
            let mut config = Config::load_from(temp).unwrap();
            // Anything 1 MiB or larger skips the copy
            config.set("backup.skip_large_files_mb", json!(1)).unwrap();
            config
        };
        std::fs::write(env.inbox.path().join("big.txt"), vec![b'x'; 2 * 1024 * 1024]).unwrap();

        let mut audit = env.audit();
        let proposal = env.propose(&mut audit, true);
        let pid = proposal.id().unwrap();

        let outcome = Executor::new(&mut audit, env.organizer.path().to_path_buf(), &env.config)
            .execute(&proposal)
            .unwrap();

        assert!(outcome.success);
        assert!(!paths::backup_dir(env.organizer.path(), pid)
            .join("big.txt")
            .exists());
        // The backup decision is recorded on the proposal
        let row = ProposalRow::find_by_id(audit.connection(), pid)
            .unwrap()
            .unwrap();
        assert_eq!(row.backups_enabled, Some(true));
    }

    #[test]
    fn test_cancel_between_files_keeps_completed_moves() {
        let env = Env::new();
        std::fs::write(env.inbox.path().join("a.txt"), b"a").unwrap();
        std::fs::write(env.inbox.path().join("b.txt"), b"b").unwrap();

        let mut audit = env.audit();
        let proposal = env.propose(&mut audit, true);

        // Already set: the executor must stop before the first file
        let cancel = Arc::new(AtomicBool::new(true));
        let outcome = Executor::new(&mut audit, env.organizer.path().to_path_buf(), &env.config)
            .with_cancel(cancel)
            .execute(&proposal)
            .unwrap();

        assert!(outcome.cancelled);
        assert!(!outcome.success);
        assert_eq!(outcome.files_moved, 0);
        assert!(env.inbox.path().join("a.txt").exists());
        assert!(env.inbox.path().join("b.txt").exists());
    }

    #[test]
    fn test_safe_mode_blocks_execution() {
        let env = Env::new();
        std::fs::write(env.inbox.path().join("a.txt"), b"x").unwrap();

        let mut audit = env.audit();
        let proposal = env.propose(&mut audit, true);

        let err = Executor::new(&mut audit, env.organizer.path().to_path_buf(), &env.config)
            .with_safe_mode(true)
            .execute(&proposal)
            .unwrap_err();
        assert_eq!(err.code(), "E004");
    }

    #[test]
    fn test_collision_destinations_both_exist_after_execute() {
        let env = Env::new();
        let sub_a = env.inbox.path().join("a");
        let sub_b = env.inbox.path().join("b");
        std::fs::create_dir_all(&sub_a).unwrap();
        std::fs::create_dir_all(&sub_b).unwrap();
        std::fs::write(sub_a.join("notes.txt"), b"first").unwrap();
        std::fs::write(sub_b.join("notes.txt"), b"second").unwrap();

        let mut audit = env.audit();

        let categorizer = Categorizer::from_config(&env.config);
        let risk = RiskAssessor::new(Redactor::default());
        let extractor = TextExtractor;
        let scanner = Scanner::new(&env.config, &extractor, &categorizer, &risk);
        let files = scanner.scan(env.inbox.path(), true).unwrap();
        assert_eq!(files.len(), 2);

        let scan_id = audit.record_scan(env.inbox.path(), files.len()).unwrap();
        let planner = Planner::new(&categorizer);
        let (mut proposal, _) = planner.plan(scan_id, &files, env.base.path());
        audit.record_propose(&mut proposal).unwrap();
        audit.record_approval(proposal.id().unwrap(), true).unwrap();

        let outcome = Executor::new(&mut audit, env.organizer.path().to_path_buf(), &env.config)
            .execute(&proposal)
            .unwrap();
        assert!(outcome.success);

        assert!(env.base.path().join("Documents/notes.txt").exists());
        assert!(env.base.path().join("Documents/notes (1).txt").exists());
    }

    #[test]
    fn test_move_file_preserves_content() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src.bin");
        let dst = temp.path().join("dst.bin");
        let content: Vec<u8> = (0..=255).collect();
        std::fs::write(&src, &content).unwrap();

        move_file(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), content);
    }
}
