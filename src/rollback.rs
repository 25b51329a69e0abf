// src/rollback.rs

//! Rollback of executed proposals
//!
//! Inverts a proposal's Move rows in the order they were performed. A file
//! still at its destination is renamed back; a missing destination is
//! restored from the proposal's backup when one exists; anything else is
//! recorded as unresolvable and skipped. Rolling back twice is a no-op.

use crate::audit::AuditStore;
use crate::db::models::{MoveRow, ProposalRow};
use crate::db::paths;
use crate::execute::move_file;
use crate::{Error, Result};
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of one rollback request
#[derive(Debug, Default)]
pub struct RollbackOutcome {
    pub files_restored: usize,
    /// Files whose destination and backup were both gone
    pub unresolvable: Vec<PathBuf>,
    /// True when the proposal had already been rolled back (no-op)
    pub already_rolled_back: bool,
}

/// One line of `rollback --show-history`
#[derive(Debug)]
pub struct HistoryEntry {
    pub proposal_id: i64,
    pub timestamp: String,
    pub file_count: i64,
    pub rolled_back: bool,
}

/// Inverts executed proposals using the audit store and backup store
pub struct RollbackManager<'a> {
    audit: &'a mut AuditStore,
    organizer_dir: PathBuf,
}

impl<'a> RollbackManager<'a> {
    pub fn new(audit: &'a mut AuditStore, organizer_dir: PathBuf) -> Self {
        Self {
            audit,
            organizer_dir,
        }
    }

    /// Roll back one proposal by id
    ///
    /// Idempotent: a proposal that is already rolled back returns
    /// successfully with zero files restored and no disk changes.
    pub fn rollback(&mut self, proposal_id: i64) -> Result<RollbackOutcome> {
        let row = ProposalRow::find_by_id(self.audit.connection(), proposal_id)?
            .ok_or_else(|| {
                Error::audit(
                    "rollback proposal",
                    rusqlite::Error::QueryReturnedNoRows,
                )
            })?;

        if row.rolled_back {
            info!("Proposal {proposal_id} already rolled back; nothing to do");
            return Ok(RollbackOutcome {
                already_rolled_back: true,
                ..RollbackOutcome::default()
            });
        }

        let moves = MoveRow::find_by_proposal(self.audit.connection(), proposal_id)?;
        let backup_dir = paths::backup_dir(&self.organizer_dir, proposal_id);

        let mut outcome = RollbackOutcome::default();
        for move_row in &moves {
            let original = PathBuf::from(&move_row.original_path);
            let current = PathBuf::from(&move_row.new_path);

            match self.restore_one(&original, &current, &backup_dir) {
                Ok(true) => outcome.files_restored += 1,
                Ok(false) => {
                    warn!(
                        original = %original.display(),
                        moved_to = %current.display(),
                        "unresolvable: destination and backup both missing"
                    );
                    outcome.unresolvable.push(original);
                }
                Err(err) => {
                    warn!("Error restoring {}: {err}", original.display());
                    outcome.unresolvable.push(original);
                }
            }
        }

        self.audit
            .record_rollback(proposal_id, outcome.files_restored)?;

        Ok(outcome)
    }

    /// Roll back the newest approved, not-yet-rolled-back proposal
    pub fn rollback_last(&mut self) -> Result<Option<(i64, RollbackOutcome)>> {
        let row = match ProposalRow::latest_reversible(self.audit.connection())? {
            Some(row) => row,
            None => return Ok(None),
        };
        let proposal_id = row.id.expect("persisted row has an id");
        let outcome = self.rollback(proposal_id)?;
        Ok(Some((proposal_id, outcome)))
    }

    /// Approved proposals, newest first
    pub fn history(&self, limit: i64) -> Result<Vec<HistoryEntry>> {
        let rows = ProposalRow::history(self.audit.connection(), limit)?;
        Ok(rows
            .into_iter()
            .map(|(row, file_count)| HistoryEntry {
                proposal_id: row.id.unwrap_or_default(),
                timestamp: row.timestamp.unwrap_or_default(),
                file_count,
                rolled_back: row.rolled_back,
            })
            .collect())
    }

    /// Restore one move; Ok(false) means unresolvable
    fn restore_one(&self, original: &Path, current: &Path, backup_dir: &Path) -> Result<bool> {
        if let Some(parent) = original.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::fs("create original directory", parent.to_path_buf(), e))?;
        }

        if current.exists() {
            move_file(current, original)?;
            debug!("Restored {} -> {}", current.display(), original.display());
            return Ok(true);
        }

        // Destination is gone; fall back to the physical backup. Content is
        // preserved exactly, file identity (inode) is not.
        let backup = original
            .file_name()
            .map(|name| backup_dir.join(name))
            .filter(|p| p.exists());

        if let Some(backup) = backup {
            fs::copy(&backup, original)
                .map_err(|e| Error::fs("restore from backup", backup.clone(), e))?;
            if let Ok(meta) = fs::metadata(&backup) {
                let _ = filetime::set_file_mtime(
                    original,
                    FileTime::from_last_modification_time(&meta),
                );
            }
            debug!(
                "Restored {} from backup {}",
                original.display(),
                backup.display()
            );
            return Ok(true);
        }

        Ok(false)
    }
}
