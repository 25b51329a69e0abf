// src/risk.rs

//! Risk assessment for file operations
//!
//! Each contributing factor adds a fixed delta and records a reason string;
//! the final score is clamped to 100. Scoring is additive and monotonic:
//! adding a sensitive match can never lower the score.

use crate::redact::{Redactor, SensitiveKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Scores at or below this are low risk
pub const LOW_RISK_MAX: u8 = 30;
/// Scores at or below this (and above [`LOW_RISK_MAX`]) are medium risk
pub const MEDIUM_RISK_MAX: u8 = 70;

/// Files larger than this add a size penalty
const LARGE_FILE_BYTES: u64 = 500 * 1024 * 1024;
/// Modification within this window adds a recency penalty
const RECENT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

const SYSTEM_EXTENSIONS: &[&str] = &["dll", "sys", "exe", "so", "dylib"];

/// Risk band for a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        if score <= LOW_RISK_MAX {
            Self::Low
        } else if score <= MEDIUM_RISK_MAX {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scores files from preview content, size, extension, and recency
#[derive(Debug, Clone, Default)]
pub struct RiskAssessor {
    redactor: Redactor,
}

impl RiskAssessor {
    pub fn new(redactor: Redactor) -> Self {
        Self { redactor }
    }

    /// Compute the risk score and its reasons for one file
    ///
    /// `mtime` is passed in rather than stat'ed here so scoring stays a
    /// pure function of its inputs.
    pub fn assess(
        &self,
        path: &Path,
        preview: &str,
        size: u64,
        mtime: Option<SystemTime>,
    ) -> (u8, Vec<String>) {
        let mut score: u32 = 0;
        let mut reasons = Vec::new();

        if !preview.is_empty() {
            for kind in self.redactor.detect(preview) {
                let delta = match kind {
                    SensitiveKind::Ssn | SensitiveKind::Card => 40,
                    SensitiveKind::Password | SensitiveKind::ApiKey => 50,
                    SensitiveKind::Email | SensitiveKind::Phone => 10,
                };
                score += delta;
                reasons.push(format!("{} (+{delta})", kind.description()));
            }
        }

        if size > LARGE_FILE_BYTES {
            score += 10;
            reasons.push("Large file (>500MB) (+10)".to_string());
        }

        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if SYSTEM_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                score += 30;
                reasons.push(format!("System file extension (.{}) (+30)", ext.to_ascii_lowercase()));
            }
        }

        if let Some(mtime) = mtime {
            let recent = SystemTime::now()
                .duration_since(mtime)
                .map(|age| age < RECENT_WINDOW)
                .unwrap_or(true);
            if recent {
                score += 20;
                reasons.push("Recently modified (<24h) (+20)".to_string());
            }
        }

        (score.min(100) as u8, reasons)
    }

    /// A score above the threshold needs explicit user approval
    pub fn requires_approval(score: u8, auto_approve_threshold: u8) -> bool {
        score > auto_approve_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessor() -> RiskAssessor {
        RiskAssessor::new(Redactor::default())
    }

    fn old_mtime() -> Option<SystemTime> {
        Some(SystemTime::now() - Duration::from_secs(7 * 24 * 60 * 60))
    }

    #[test]
    fn test_clean_file_scores_zero() {
        let (score, reasons) =
            assessor().assess(Path::new("/tmp/photo.jpg"), "", 1024, old_mtime());
        assert_eq!(score, 0);
        assert!(reasons.is_empty());
    }

    #[test]
    fn test_ssn_and_password_stack() {
        let (score, reasons) = assessor().assess(
            Path::new("/tmp/notes.txt"),
            "SSN: 123-45-6789\npassword: hunter2",
            512,
            old_mtime(),
        );
        assert!(score >= 90, "expected >=90, got {score}");
        assert_eq!(RiskLevel::from_score(score), RiskLevel::High);
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn test_distinct_classes_stack_but_clamp_at_100() {
        let (score, _) = assessor().assess(
            Path::new("/tmp/dump.txt"),
            "123-45-6789 4111-1111-1111-1111 password=x a@b.com 555-123-4567",
            512,
            None,
        );
        assert_eq!(score, 100);
    }

    #[test]
    fn test_system_extension_penalty() {
        let (score, reasons) =
            assessor().assess(Path::new("/tmp/driver.DLL"), "", 2048, old_mtime());
        assert_eq!(score, 30);
        assert!(reasons[0].contains(".dll"));
    }

    #[test]
    fn test_large_file_penalty() {
        let (score, _) = assessor().assess(
            Path::new("/tmp/video.bin"),
            "",
            600 * 1024 * 1024,
            old_mtime(),
        );
        assert_eq!(score, 10);
    }

    #[test]
    fn test_recent_modification_penalty() {
        let (score, _) = assessor().assess(
            Path::new("/tmp/fresh.txt"),
            "",
            128,
            Some(SystemTime::now()),
        );
        assert_eq!(score, 20);
    }

    #[test]
    fn test_adding_a_match_never_lowers_the_score() {
        let a = assessor();
        let (without, _) = a.assess(Path::new("/tmp/a.txt"), "plain notes", 128, old_mtime());
        let (with, _) = a.assess(
            Path::new("/tmp/a.txt"),
            "plain notes user@example.com",
            128,
            old_mtime(),
        );
        assert!(with >= without);
    }

    #[test]
    fn test_bands() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(31), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(70), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(71), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::High);
    }

    #[test]
    fn test_requires_approval_is_strict_greater_than() {
        assert!(!RiskAssessor::requires_approval(30, 30));
        assert!(RiskAssessor::requires_approval(31, 30));
    }
}
