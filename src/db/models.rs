// src/db/models.rs

//! Row models for the audit store
//!
//! Structs map one-to-one onto tables. Proposal rows are written once and
//! mutated only through the two monotonic flag flips; move and learning
//! rows are append-only.

use crate::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// One completed directory enumeration
#[derive(Debug, Clone)]
pub struct ScanRow {
    pub id: Option<i64>,
    pub timestamp: Option<String>,
    pub path: String,
    pub file_count: i64,
}

impl ScanRow {
    pub fn new(path: String, file_count: i64) -> Self {
        Self {
            id: None,
            timestamp: None,
            path,
            file_count,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO scans (path, file_count) VALUES (?1, ?2)",
            params![&self.path, self.file_count],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, path, file_count FROM scans WHERE id = ?1",
        )?;
        Ok(stmt.query_row([id], Self::from_row).optional()?)
    }

    pub fn count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM scans", [], |row| row.get(0))?)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            timestamp: row.get(1)?,
            path: row.get(2)?,
            file_count: row.get(3)?,
        })
    }
}

/// A persisted proposal: frozen plan JSON plus lifecycle flags
#[derive(Debug, Clone)]
pub struct ProposalRow {
    pub id: Option<i64>,
    pub scan_id: i64,
    pub plan_json: String,
    pub confidence: f64,
    pub timestamp: Option<String>,
    pub approved: bool,
    pub rolled_back: bool,
    /// Backup config snapshot taken at execute time; None until executed
    pub backups_enabled: Option<bool>,
}

impl ProposalRow {
    pub fn new(scan_id: i64, plan_json: String, confidence: f64) -> Self {
        Self {
            id: None,
            scan_id,
            plan_json,
            confidence,
            timestamp: None,
            approved: false,
            rolled_back: false,
            backups_enabled: None,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO proposals (scan_id, plan_json, confidence) VALUES (?1, ?2, ?3)",
            params![self.scan_id, &self.plan_json, self.confidence],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, scan_id, plan_json, confidence, timestamp, approved, rolled_back,
                    backups_enabled
             FROM proposals WHERE id = ?1",
        )?;
        Ok(stmt.query_row([id], Self::from_row).optional()?)
    }

    /// The newest proposal that has been approved and not yet rolled back
    pub fn latest_reversible(conn: &Connection) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, scan_id, plan_json, confidence, timestamp, approved, rolled_back,
                    backups_enabled
             FROM proposals
             WHERE approved = 1 AND rolled_back = 0
             ORDER BY id DESC LIMIT 1",
        )?;
        Ok(stmt.query_row([], Self::from_row).optional()?)
    }

    /// Approved proposals, newest first, with their move counts
    pub fn history(conn: &Connection, limit: i64) -> Result<Vec<(Self, i64)>> {
        let mut stmt = conn.prepare(
            "SELECT p.id, p.scan_id, p.plan_json, p.confidence, p.timestamp, p.approved,
                    p.rolled_back, p.backups_enabled,
                    (SELECT COUNT(*) FROM moves m WHERE m.proposal_id = p.id)
             FROM proposals p
             WHERE p.approved = 1
             ORDER BY p.id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit], |row| {
                let proposal = Self::from_row(row)?;
                let move_count: i64 = row.get(8)?;
                Ok((proposal, move_count))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Flip `approved` to true. Monotonic: there is no way back.
    pub fn mark_approved(&mut self, conn: &Connection) -> Result<()> {
        let id = self.require_id()?;
        conn.execute(
            "UPDATE proposals SET approved = 1 WHERE id = ?1",
            params![id],
        )?;
        self.approved = true;
        Ok(())
    }

    /// Flip `rolled_back` to true. Monotonic: there is no way back.
    pub fn mark_rolled_back(&mut self, conn: &Connection) -> Result<()> {
        let id = self.require_id()?;
        conn.execute(
            "UPDATE proposals SET rolled_back = 1 WHERE id = ?1",
            params![id],
        )?;
        self.rolled_back = true;
        Ok(())
    }

    /// Record whether backups were enabled when this proposal executed
    pub fn record_backup_mode(&mut self, conn: &Connection, enabled: bool) -> Result<()> {
        let id = self.require_id()?;
        conn.execute(
            "UPDATE proposals SET backups_enabled = ?1 WHERE id = ?2",
            params![enabled, id],
        )?;
        self.backups_enabled = Some(enabled);
        Ok(())
    }

    fn require_id(&self) -> Result<i64> {
        self.id.ok_or_else(|| {
            Error::audit(
                "update proposal",
                rusqlite::Error::QueryReturnedNoRows,
            )
        })
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            scan_id: row.get(1)?,
            plan_json: row.get(2)?,
            confidence: row.get(3)?,
            timestamp: row.get(4)?,
            approved: row.get(5)?,
            rolled_back: row.get(6)?,
            backups_enabled: row.get(7)?,
        })
    }
}

/// One successful file move, append-only
#[derive(Debug, Clone)]
pub struct MoveRow {
    pub id: Option<i64>,
    pub proposal_id: i64,
    pub original_path: String,
    pub new_path: String,
    pub timestamp: Option<String>,
}

impl MoveRow {
    pub fn new(proposal_id: i64, original_path: String, new_path: String) -> Self {
        Self {
            id: None,
            proposal_id,
            original_path,
            new_path,
            timestamp: None,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO moves (proposal_id, original_path, new_path) VALUES (?1, ?2, ?3)",
            params![self.proposal_id, &self.original_path, &self.new_path],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Moves for a proposal in the order they were performed
    pub fn find_by_proposal(conn: &Connection, proposal_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, proposal_id, original_path, new_path, timestamp
             FROM moves WHERE proposal_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([proposal_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM moves", [], |row| row.get(0))?)
    }

    /// Moves whose source or destination mentions `name`
    pub fn search(conn: &Connection, name: &str, limit: i64) -> Result<Vec<Self>> {
        let pattern = format!("%{name}%");
        let mut stmt = conn.prepare(
            "SELECT id, proposal_id, original_path, new_path, timestamp
             FROM moves
             WHERE original_path LIKE ?1 OR new_path LIKE ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![pattern, limit], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            proposal_id: row.get(1)?,
            original_path: row.get(2)?,
            new_path: row.get(3)?,
            timestamp: row.get(4)?,
        })
    }
}

/// One approval outcome for a (file type, folder) pairing, append-only
#[derive(Debug, Clone)]
pub struct LearningRow {
    pub id: Option<i64>,
    pub file_type: String,
    pub target_folder: String,
    pub approved: bool,
    pub timestamp: Option<String>,
}

/// Aggregated learning signal for one target folder
#[derive(Debug, Clone, PartialEq)]
pub struct LearningPattern {
    pub target_folder: String,
    pub count: i64,
    pub approval_rate: f64,
}

impl LearningRow {
    pub fn new(file_type: String, target_folder: String, approved: bool) -> Self {
        Self {
            id: None,
            file_type,
            target_folder,
            approved,
            timestamp: None,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO learning (file_type, target_folder, approved) VALUES (?1, ?2, ?3)",
            params![&self.file_type, &self.target_folder, self.approved],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Folders this file type has been approved into, strongest signal first
    pub fn patterns_for(
        conn: &Connection,
        file_type: &str,
        min_count: i64,
    ) -> Result<Vec<LearningPattern>> {
        let mut stmt = conn.prepare(
            "SELECT target_folder,
                    COUNT(*) AS count,
                    SUM(CASE WHEN approved = 1 THEN 1 ELSE 0 END) * 1.0 / COUNT(*) AS approval_rate
             FROM learning
             WHERE file_type = ?1
             GROUP BY target_folder
             HAVING count >= ?2
             ORDER BY count DESC, approval_rate DESC",
        )?;
        let rows = stmt
            .query_map(params![file_type, min_count], |row| {
                Ok(LearningPattern {
                    target_folder: row.get(0)?,
                    count: row.get(1)?,
                    approval_rate: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
