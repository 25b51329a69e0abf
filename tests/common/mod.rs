// tests/common/mod.rs

//! Shared fixtures for integration tests.

use curator::audit::AuditStore;
use curator::categorize::Categorizer;
use curator::config::Config;
use curator::plan::{Planner, Proposal};
use curator::redact::Redactor;
use curator::risk::RiskAssessor;
use curator::scan::{FileRecord, Scanner};
use curator::suggest::Suggester;
use curator::TextExtractor;
use filetime::FileTime;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// A throwaway organizer dir, inbox, and base dir
pub struct TestEnv {
    pub organizer: TempDir,
    pub inbox: TempDir,
    pub base: TempDir,
    pub config: Config,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            organizer: TempDir::new().unwrap(),
            inbox: TempDir::new().unwrap(),
            base: TempDir::new().unwrap(),
            config: Config::defaults(),
        }
    }

    pub fn audit(&self) -> AuditStore {
        AuditStore::open(self.organizer.path(), Redactor::disabled()).unwrap()
    }

    /// Write a file into the inbox with an mtime two days in the past, so
    /// the recency risk factor stays quiet
    pub fn seed_file(&self, name: &str, content: &[u8]) {
        let path = self.inbox.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        age_file(&path);
    }

    pub fn scan(&self, recursive: bool) -> Vec<FileRecord> {
        let categorizer = Categorizer::from_config(&self.config);
        let risk = RiskAssessor::new(Redactor::default());
        let extractor = TextExtractor;
        let scanner = Scanner::new(&self.config, &extractor, &categorizer, &risk);
        scanner.scan(self.inbox.path(), recursive).unwrap()
    }

    /// Scan, plan (optionally with a suggester), and persist the proposal
    pub fn propose(
        &self,
        audit: &mut AuditStore,
        suggester: Option<&dyn Suggester>,
    ) -> (Vec<FileRecord>, Proposal, Option<curator::Error>) {
        let files = self.scan(true);
        let scan_id = audit.record_scan(self.inbox.path(), files.len()).unwrap();

        let categorizer = Categorizer::from_config(&self.config);
        let planner = Planner::new(&categorizer).with_suggester(suggester);
        let (mut proposal, warning) = planner.plan(scan_id, &files, self.base.path());
        audit.record_propose(&mut proposal).unwrap();

        (files, proposal, warning)
    }
}

/// Backdate a file's mtime by 48 hours
pub fn age_file(path: &Path) {
    let two_days_ago = SystemTime::now() - Duration::from_secs(48 * 60 * 60);
    filetime::set_file_mtime(path, FileTime::from_system_time(two_days_ago)).unwrap();
}
