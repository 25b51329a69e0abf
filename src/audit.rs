// src/audit.rs

//! Dual-log audit store
//!
//! Every state transition lands in two places, in a fixed order: the
//! relational store commits first (source of truth), then the transition is
//! mirrored to the append-only `audit.jsonl` stream, then a best-effort
//! line goes to the human `operations.log`.
//!
//! Each JSONL record carries a `crc` field computed over the record body.
//! Replay verifies the checksum and stops at the first corrupt record, so
//! tampering or torn writes are detectable and everything after them is
//! suspect. The relational store stays authoritative either way.
//!
//! Single-writer discipline: one `AuditStore` per process, guarded by the
//! process lock.

use crate::db::{self, models::*, paths};
use crate::plan::Proposal;
use crate::redact::Redactor;
use crate::{Error, Result};
use chrono::{Local, Utc};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// One replayed transition from the JSONL stream
#[derive(Debug, Clone)]
pub struct Transition {
    pub line: usize,
    pub value: Value,
}

/// Outcome of replaying the JSONL stream
#[derive(Debug, Clone, Default)]
pub struct Replay {
    pub transitions: Vec<Transition>,
    /// 1-based line number of the first corrupt record, if any
    pub corrupt_at: Option<usize>,
}

/// The audit store: relational tables, JSONL stream, human log
pub struct AuditStore {
    conn: Connection,
    jsonl: File,
    jsonl_path: PathBuf,
    human_log: Option<File>,
    redactor: Redactor,
}

impl AuditStore {
    /// Open (creating if needed) the audit store under `organizer_dir`
    pub fn open(organizer_dir: &Path, redactor: Redactor) -> Result<Self> {
        std::fs::create_dir_all(organizer_dir)
            .map_err(|e| Error::fs("create organizer directory", organizer_dir.to_path_buf(), e))?;

        let conn = db::open(&paths::audit_db(organizer_dir))?;

        let jsonl_path = paths::audit_jsonl(organizer_dir);
        let jsonl = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&jsonl_path)
            .map_err(|e| Error::fs("open audit stream", jsonl_path.clone(), e))?;

        let log_path = paths::operations_log(organizer_dir);
        let human_log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .ok();

        Ok(Self {
            conn,
            jsonl,
            jsonl_path,
            human_log,
            redactor,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Flush and fsync the JSONL stream
    ///
    /// The executor calls this before starting a move batch so the approval
    /// is durable before any file changes.
    pub fn sync(&mut self) -> Result<()> {
        self.jsonl.flush()?;
        self.jsonl.sync_all()?;
        Ok(())
    }

    /// Record a completed enumeration; returns the scan id
    pub fn record_scan(&mut self, path: &Path, file_count: usize) -> Result<i64> {
        let scan_id =
            ScanRow::new(path.display().to_string(), file_count as i64).insert(&self.conn)?;

        self.append_jsonl(
            "scan",
            json!({
                "path": path.display().to_string(),
                "file_count": file_count,
                "scan_id": scan_id,
            }),
        )?;
        self.human(&format!(
            "SCAN: {} -> {} files discovered",
            self.redactor.redact_path(path),
            file_count
        ));

        Ok(scan_id)
    }

    /// Persist a proposal; assigns and returns its id
    ///
    /// After this call the plan bytes are frozen. Only the approved and
    /// rolled-back flags may change, through the methods below.
    pub fn record_propose(&mut self, proposal: &mut Proposal) -> Result<i64> {
        let plan_json = proposal.to_plan_json()?;
        let mut row = ProposalRow::new(proposal.scan_id(), plan_json, proposal.confidence());
        let proposal_id = row.insert(&self.conn)?;
        proposal.set_id(proposal_id);

        self.append_jsonl(
            "propose",
            json!({
                "scan_id": proposal.scan_id(),
                "proposal_id": proposal_id,
                "confidence": proposal.confidence(),
            }),
        )?;
        self.human(&format!(
            "PROPOSE: plan generated (confidence: {:.0}%)",
            proposal.confidence() * 100.0
        ));

        Ok(proposal_id)
    }

    /// Record the user's approval decision
    ///
    /// The relational flag only ever flips false→true; a rejection is
    /// visible in the stream but leaves the row untouched.
    pub fn record_approval(&mut self, proposal_id: i64, approved: bool) -> Result<()> {
        if approved {
            db::transaction(&mut self.conn, |tx| {
                let mut row = ProposalRow::find_by_id(tx, proposal_id)?.ok_or_else(|| {
                    Error::audit("approve proposal", rusqlite::Error::QueryReturnedNoRows)
                })?;
                row.mark_approved(tx)
            })?;
        }

        self.append_jsonl(
            "approval",
            json!({
                "proposal_id": proposal_id,
                "approved": approved,
            }),
        )?;
        let status = if approved { "APPROVED" } else { "REJECTED" };
        self.human(&format!("{status}: Proposal {proposal_id}"));

        Ok(())
    }

    /// Record the backup config snapshot taken when execution starts
    pub fn record_backup_mode(&mut self, proposal_id: i64, enabled: bool) -> Result<()> {
        let mut row = ProposalRow::find_by_id(&self.conn, proposal_id)?
            .ok_or_else(|| Error::audit(
                "record backup mode",
                rusqlite::Error::QueryReturnedNoRows,
            ))?;
        row.record_backup_mode(&self.conn, enabled)
    }

    /// Append a move row. The row commits durably before this returns; a
    /// move exists on disk iff its row exists.
    pub fn record_move(
        &mut self,
        proposal_id: i64,
        original_path: &Path,
        new_path: &Path,
    ) -> Result<i64> {
        let move_id = MoveRow::new(
            proposal_id,
            original_path.display().to_string(),
            new_path.display().to_string(),
        )
        .insert(&self.conn)?;
        Ok(move_id)
    }

    /// Record the end of an execute batch
    pub fn record_execute(
        &mut self,
        proposal_id: i64,
        files_moved: usize,
        success: bool,
    ) -> Result<()> {
        self.append_jsonl(
            "execute",
            json!({
                "proposal_id": proposal_id,
                "files_moved": files_moved,
                "success": success,
            }),
        )?;
        if success {
            self.human(&format!("EXECUTE: Moved {files_moved} files successfully"));
        } else {
            self.human(&format!(
                "EXECUTE: Completed with failures ({files_moved} files moved)"
            ));
        }
        Ok(())
    }

    /// Record a completed rollback and flip the proposal flag
    pub fn record_rollback(&mut self, proposal_id: i64, files_restored: usize) -> Result<()> {
        db::transaction(&mut self.conn, |tx| {
            let mut row = ProposalRow::find_by_id(tx, proposal_id)?.ok_or_else(|| {
                Error::audit(
                    "mark proposal rolled back",
                    rusqlite::Error::QueryReturnedNoRows,
                )
            })?;
            row.mark_rolled_back(tx)
        })?;

        self.append_jsonl(
            "rollback",
            json!({
                "proposal_id": proposal_id,
                "files_restored": files_restored,
            }),
        )?;
        self.human(&format!(
            "ROLLBACK: Restored {files_restored} files from proposal {proposal_id}"
        ));
        Ok(())
    }

    /// Record an approval outcome for pattern learning
    pub fn record_learning(
        &mut self,
        file_type: &str,
        target_folder: &str,
        approved: bool,
    ) -> Result<()> {
        LearningRow::new(
            file_type.to_string(),
            target_folder.to_string(),
            approved,
        )
        .insert(&self.conn)?;
        Ok(())
    }

    /// Replay the JSONL stream, verifying checksums
    ///
    /// Stops at the first record whose checksum does not match; everything
    /// before it is returned, the corrupt line number is reported.
    pub fn replay(&self) -> Result<Replay> {
        let file = match File::open(&self.jsonl_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(Error::fs("read audit stream", self.jsonl_path.clone(), e)),
        };

        let mut replay = Replay::default();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line_no = index + 1;
            let line = line?;
            if line.is_empty() {
                continue;
            }

            match verify_record(&line) {
                Some(value) => replay.transitions.push(Transition {
                    line: line_no,
                    value,
                }),
                None => {
                    warn!("Audit stream corrupt at line {line_no}; stopping replay");
                    replay.corrupt_at = Some(line_no);
                    break;
                }
            }
        }

        Ok(replay)
    }

    fn append_jsonl(&mut self, action: &str, fields: Value) -> Result<()> {
        let mut record = Map::new();
        record.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
        record.insert("action".to_string(), json!(action));
        if let Value::Object(fields) = fields {
            for (key, value) in fields {
                record.insert(key, value);
            }
        }

        let body = serde_json::to_string(&Value::Object(record.clone()))?;
        let crc = crc32fast::hash(body.as_bytes());
        record.insert("crc".to_string(), json!(format!("{crc:08x}")));

        let line = serde_json::to_string(&Value::Object(record))?;
        writeln!(self.jsonl, "{line}")?;
        self.jsonl.flush()?;
        Ok(())
    }

    /// Best-effort human log line; failures are logged, never fatal
    fn human(&mut self, message: &str) {
        if let Some(log) = &mut self.human_log {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            if let Err(err) = writeln!(log, "[{stamp}] {message}") {
                warn!("Failed to write operations log: {err}");
            }
        }
    }
}

/// Verify one JSONL line against its embedded checksum
fn verify_record(line: &str) -> Option<Value> {
    let mut value: Value = serde_json::from_str(line).ok()?;
    let object = value.as_object_mut()?;
    let stored = object.remove("crc")?;
    let stored = u32::from_str_radix(stored.as_str()?, 16).ok()?;

    let body = serde_json::to_string(&value).ok()?;
    (crc32fast::hash(body.as_bytes()) == stored).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::Categorizer;
    use crate::config::Config;
    use crate::plan::Planner;
    use crate::scan::FileRecord;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> AuditStore {
        AuditStore::open(temp.path(), Redactor::disabled()).unwrap()
    }

    fn sample_proposal(store: &mut AuditStore) -> Proposal {
        let scan_id = store.record_scan(Path::new("/inbox"), 1).unwrap();
        let config = Config::defaults();
        let categorizer = Categorizer::from_config(&config);
        let planner = Planner::new(&categorizer);

        let record = FileRecord {
            path: PathBuf::from("/inbox/report.pdf"),
            size: 2048,
            preview: String::new(),
            metadata: BTreeMap::new(),
            doc_type: crate::extract::DocType::Pdf,
            categories: crate::categorize::Categories {
                kind: "Documents".to_string(),
                context: "General".to_string(),
                time: "2026".to_string(),
                smart: String::new(),
            },
            risk_score: 0,
            risk_reasons: Vec::new(),
        };

        let (mut proposal, _) = planner.plan(scan_id, &[record], Path::new("/base"));
        store.record_propose(&mut proposal).unwrap();
        proposal
    }

    #[test]
    fn test_scan_row_and_jsonl_agree() {
        let temp = TempDir::new().unwrap();
        let mut store = store(&temp);

        let scan_id = store.record_scan(Path::new("/inbox"), 5).unwrap();

        let row = ScanRow::find_by_id(store.connection(), scan_id)
            .unwrap()
            .unwrap();
        assert_eq!(row.file_count, 5);

        let replay = store.replay().unwrap();
        assert_eq!(replay.transitions.len(), 1);
        assert_eq!(replay.transitions[0].value["action"], "scan");
        assert_eq!(replay.transitions[0].value["scan_id"], scan_id);
        assert!(replay.corrupt_at.is_none());
    }

    #[test]
    fn test_propose_assigns_id_and_freezes_plan() {
        let temp = TempDir::new().unwrap();
        let mut store = store(&temp);

        let proposal = sample_proposal(&mut store);
        let id = proposal.id().unwrap();

        let row = ProposalRow::find_by_id(store.connection(), id)
            .unwrap()
            .unwrap();
        assert!(!row.approved);
        assert!(!row.rolled_back);

        let restored = Proposal::from_row(&row).unwrap();
        assert_eq!(restored.files(), proposal.files());
    }

    #[test]
    fn test_rejection_leaves_flag_untouched() {
        let temp = TempDir::new().unwrap();
        let mut store = store(&temp);
        let proposal = sample_proposal(&mut store);
        let id = proposal.id().unwrap();

        store.record_approval(id, false).unwrap();
        let row = ProposalRow::find_by_id(store.connection(), id)
            .unwrap()
            .unwrap();
        assert!(!row.approved);

        store.record_approval(id, true).unwrap();
        let row = ProposalRow::find_by_id(store.connection(), id)
            .unwrap()
            .unwrap();
        assert!(row.approved);
    }

    #[test]
    fn test_replay_stops_at_corruption() {
        let temp = TempDir::new().unwrap();
        let mut store = store(&temp);
        store.record_scan(Path::new("/a"), 1).unwrap();
        store.record_scan(Path::new("/b"), 2).unwrap();
        drop(store);

        // Flip a byte inside the second record's payload
        let jsonl_path = paths::audit_jsonl(temp.path());
        let content = std::fs::read_to_string(&jsonl_path).unwrap();
        let tampered = content.replacen("\"/b\"", "\"/c\"", 1);
        assert_ne!(content, tampered);
        std::fs::write(&jsonl_path, tampered).unwrap();

        let store = AuditStore::open(temp.path(), Redactor::disabled()).unwrap();
        let replay = store.replay().unwrap();
        assert_eq!(replay.transitions.len(), 1);
        assert_eq!(replay.corrupt_at, Some(2));
    }

    #[test]
    fn test_move_rows_are_readable_by_fresh_connection() {
        let temp = TempDir::new().unwrap();
        let mut store = store(&temp);
        let proposal = sample_proposal(&mut store);
        let id = proposal.id().unwrap();

        store
            .record_move(id, Path::new("/inbox/report.pdf"), Path::new("/base/Documents/report.pdf"))
            .unwrap();
        drop(store);

        // A fresh process sees the committed row
        let store = AuditStore::open(temp.path(), Redactor::disabled()).unwrap();
        let moves = MoveRow::find_by_proposal(store.connection(), id).unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].new_path, "/base/Documents/report.pdf");
    }

    #[test]
    fn test_execute_and_rollback_transitions() {
        let temp = TempDir::new().unwrap();
        let mut store = store(&temp);
        let proposal = sample_proposal(&mut store);
        let id = proposal.id().unwrap();

        store.record_approval(id, true).unwrap();
        store.record_execute(id, 1, true).unwrap();
        store.record_rollback(id, 1).unwrap();

        let row = ProposalRow::find_by_id(store.connection(), id)
            .unwrap()
            .unwrap();
        assert!(row.rolled_back);

        let actions: Vec<String> = store
            .replay()
            .unwrap()
            .transitions
            .iter()
            .map(|t| t.value["action"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            actions,
            vec!["scan", "propose", "approval", "execute", "rollback"]
        );
    }

    #[test]
    fn test_human_log_written() {
        let temp = TempDir::new().unwrap();
        let mut store = store(&temp);
        store.record_scan(Path::new("/inbox"), 3).unwrap();
        drop(store);

        let log = std::fs::read_to_string(paths::operations_log(temp.path())).unwrap();
        assert!(log.contains("SCAN: /inbox -> 3 files discovered"));
    }
}
