// src/lib.rs

//! Curator
//!
//! Organizes a local file hierarchy into a stable, categorized layout
//! through an auditable plan lifecycle: scan → analyze → categorize →
//! risk-score → propose → approve → execute → rollback.
//!
//! # Architecture
//!
//! - Database-first: the relational audit store is the source of truth;
//!   the JSONL stream mirrors every transition with per-record checksums
//! - Proposals are immutable once persisted; only the approved and
//!   rolled-back flags flip, monotonically
//! - Every executed move has a Move row and (for small files) a physical
//!   backup, so any executed proposal can be reversed exactly
//! - Single-writer: one process owns the organizer directory, enforced by
//!   a PID lock file
//! - Opaque collaborators: content extraction and destination suggestion
//!   sit behind traits; the core runs with neither

pub mod audit;
pub mod categorize;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
mod error;
pub mod execute;
pub mod extract;
pub mod hash;
pub mod plan;
pub mod recovery;
pub mod redact;
pub mod risk;
pub mod rollback;
pub mod scan;
pub mod suggest;

pub use audit::AuditStore;
pub use categorize::{Categories, Categorizer};
pub use config::Config;
pub use error::{format_for_display, Error, Result};
pub use execute::{ExecuteOutcome, Executor};
pub use extract::{DocType, Extracted, Extractor, TextExtractor};
pub use plan::{PlannedFile, Planner, Proposal};
pub use recovery::{ProcessLock, RecoveryManager, ScanState};
pub use redact::{Redactor, SensitiveKind};
pub use risk::{RiskAssessor, RiskLevel};
pub use rollback::{RollbackManager, RollbackOutcome};
pub use scan::{FileRecord, ScanStats, Scanner};
pub use suggest::{HttpSuggester, Suggester, SuggestionBatch};
