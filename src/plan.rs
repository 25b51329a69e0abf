// src/plan.rs

//! Proposal planning
//!
//! The planner combines rule-based destinations with optional suggester
//! output into an immutable `Proposal`. Suggester output wins per file when
//! present and parseable; the rule table is the deterministic fallback.
//! Destinations within one proposal are always unique.
//!
//! Once persisted, a proposal is frozen: the approved/rolled-back flags
//! live on the audit row, never on this value.

use crate::categorize::{Categorizer, OTHER_CATEGORY};
use crate::db::models::ProposalRow;
use crate::risk::RiskLevel;
use crate::scan::FileRecord;
use crate::suggest::{Suggester, BATCH_LIMIT};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

/// Confidence assigned when planning falls back to rules alone
pub const RULE_BASED_CONFIDENCE: f64 = 0.75;

const RULE_BASED_REASONING: &str = "Rule-based organization";
const SUGGESTED_REASONING: &str = "AI-generated organization plan";

/// One source→destination pair inside a proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub risk_score: u8,
}

impl PlannedFile {
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.risk_score)
    }
}

/// Stored plan shape (`proposals.plan_json`)
#[derive(Debug, Serialize, Deserialize)]
struct PlanJson {
    files: Vec<PlanFileJson>,
    confidence: f64,
    reasoning: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PlanFileJson {
    source: String,
    destination: String,
    risk_score: u8,
    risk_level: RiskLevel,
}

/// An immutable, persistable plan of file moves for one scan
#[derive(Debug, Clone)]
pub struct Proposal {
    id: Option<i64>,
    scan_id: i64,
    files: Vec<PlannedFile>,
    confidence: f64,
    reasoning: String,
}

impl Proposal {
    /// Database id, present once persisted
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn scan_id(&self) -> i64 {
        self.scan_id
    }

    pub fn files(&self) -> &[PlannedFile] {
        &self.files
    }

    /// Confidence in [0, 1]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Called by the audit store when the row is inserted
    pub(crate) fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    /// Serialize the frozen plan for the `proposals` row
    pub fn to_plan_json(&self) -> Result<String> {
        let plan = PlanJson {
            files: self
                .files
                .iter()
                .map(|f| PlanFileJson {
                    source: f.source.display().to_string(),
                    destination: f.destination.display().to_string(),
                    risk_score: f.risk_score,
                    risk_level: f.risk_level(),
                })
                .collect(),
            confidence: self.confidence,
            reasoning: self.reasoning.clone(),
        };
        Ok(serde_json::to_string(&plan)?)
    }

    /// Reconstruct a proposal from its persisted row
    ///
    /// Destinations are stored absolute, so reconstruction is exact and an
    /// execute after restart moves files to the same places the original
    /// process would have.
    pub fn from_row(row: &ProposalRow) -> Result<Self> {
        let plan: PlanJson = serde_json::from_str(&row.plan_json)?;
        Ok(Self {
            id: row.id,
            scan_id: row.scan_id,
            files: plan
                .files
                .into_iter()
                .map(|f| PlannedFile {
                    source: PathBuf::from(f.source),
                    destination: PathBuf::from(f.destination),
                    risk_score: f.risk_score,
                })
                .collect(),
            confidence: plan.confidence,
            reasoning: plan.reasoning,
        })
    }

    /// Highest risk score across the planned files
    pub fn max_risk_score(&self) -> u8 {
        self.files.iter().map(|f| f.risk_score).max().unwrap_or(0)
    }
}

/// Builds proposals from scanned records
pub struct Planner<'a> {
    categorizer: &'a Categorizer,
    suggester: Option<&'a dyn Suggester>,
    /// Learned `extension → folder` overrides for otherwise-unmatched files
    learned: HashMap<String, String>,
}

impl<'a> Planner<'a> {
    pub fn new(categorizer: &'a Categorizer) -> Self {
        Self {
            categorizer,
            suggester: None,
            learned: HashMap::new(),
        }
    }

    pub fn with_suggester(mut self, suggester: Option<&'a dyn Suggester>) -> Self {
        self.suggester = suggester;
        self
    }

    pub fn with_learned_patterns(mut self, learned: HashMap<String, String>) -> Self {
        self.learned = learned;
        self
    }

    /// Produce an unpersisted proposal for `records` under `base_dir`
    ///
    /// Returns the proposal plus an optional recoverable suggester error:
    /// the plan is still valid (rule-based), the error is surfaced to the
    /// user as a warning.
    pub fn plan(
        &self,
        scan_id: i64,
        records: &[FileRecord],
        base_dir: &Path,
    ) -> (Proposal, Option<Error>) {
        let mut confidence = RULE_BASED_CONFIDENCE;
        let mut reasoning = RULE_BASED_REASONING.to_string();
        let mut warning = None;
        let mut suggested: HashMap<String, String> = HashMap::new();

        if let Some(suggester) = self.suggester {
            if !records.is_empty() {
                let batch = &records[..records.len().min(BATCH_LIMIT)];
                match suggester.suggest(batch) {
                    Ok(batch) => {
                        confidence = f64::from(batch.overall_confidence) / 100.0;
                        reasoning = SUGGESTED_REASONING.to_string();
                        for suggestion in batch.suggestions {
                            suggested.insert(suggestion.file, suggestion.destination);
                        }
                    }
                    Err(err) => {
                        warn!("Suggester unavailable ({}): {err}", err.code());
                        warning = Some(err);
                    }
                }
            }
        }

        let mut used: HashSet<PathBuf> = HashSet::new();
        let mut files = Vec::with_capacity(records.len());

        for record in records {
            let name = record.file_name();
            let destination = match suggested.get(&name) {
                Some(folder) => match sanitize_suggested(folder) {
                    Some(relative) => base_dir.join(relative).join(&name),
                    None => {
                        warn!(
                            "Rejecting suggested destination outside base dir: {folder:?}"
                        );
                        self.rule_destination(record, base_dir)
                    }
                },
                None => self.rule_destination(record, base_dir),
            };

            let destination = dedupe_destination(destination, &used);
            used.insert(destination.clone());

            files.push(PlannedFile {
                source: record.path.clone(),
                destination,
                risk_score: record.risk_score,
            });
        }

        info!(
            "Planned {} move(s) for scan {scan_id} ({reasoning}, confidence {confidence:.2})",
            files.len()
        );

        (
            Proposal {
                id: None,
                scan_id,
                files,
                confidence,
                reasoning,
            },
            warning,
        )
    }

    fn rule_destination(&self, record: &FileRecord, base_dir: &Path) -> PathBuf {
        let name = record.file_name();

        // Approval history can place extensions the rule table does not know
        if record.categories.kind == OTHER_CATEGORY {
            if let Some(ext) = record.path.extension().and_then(|e| e.to_str()) {
                if let Some(folder) = self.learned.get(&ext.to_ascii_lowercase()) {
                    return base_dir.join(folder).join(&name);
                }
            }
        }

        self.categorizer
            .build_path(base_dir, &record.categories)
            .join(name)
    }
}

/// A suggested folder must stay inside the base directory: relative, no
/// parent traversal, no root jumps.
fn sanitize_suggested(folder: &str) -> Option<PathBuf> {
    let trimmed = folder.trim();
    if trimmed.is_empty() {
        return None;
    }
    let path = Path::new(trimmed);
    let mut components = path.components().peekable();
    if components.peek().is_none() {
        return None;
    }
    components
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| path.to_path_buf())
}

/// Make `destination` unique among `used` by inserting ` (n)` before the
/// extension.
fn dedupe_destination(destination: PathBuf, used: &HashSet<PathBuf>) -> PathBuf {
    if !used.contains(&destination) {
        return destination;
    }

    let parent = destination.parent().unwrap_or(Path::new(""));
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = destination
        .extension()
        .map(|e| e.to_string_lossy().into_owned());

    for n in 1.. {
        let candidate_name = match &ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = parent.join(candidate_name);
        if !used.contains(&candidate) {
            return candidate;
        }
    }
    unreachable!("dedupe loop always terminates");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::Categories;
    use crate::config::Config;
    use crate::extract::DocType;
    use crate::suggest::{Suggestion, SuggestionBatch};
    use std::collections::BTreeMap;

    fn record(name: &str, kind: &str) -> FileRecord {
        FileRecord {
            path: PathBuf::from("/inbox").join(name),
            size: 1024,
            preview: String::new(),
            metadata: BTreeMap::new(),
            doc_type: DocType::Unknown,
            categories: Categories {
                kind: kind.to_string(),
                context: "General".to_string(),
                time: "2026".to_string(),
                smart: String::new(),
            },
            risk_score: 0,
            risk_reasons: Vec::new(),
        }
    }

    struct StaticSuggester(SuggestionBatch);

    impl Suggester for StaticSuggester {
        fn suggest(&self, _records: &[FileRecord]) -> crate::Result<SuggestionBatch> {
            Ok(self.0.clone())
        }
    }

    struct FailingSuggester;

    impl Suggester for FailingSuggester {
        fn suggest(&self, _records: &[FileRecord]) -> crate::Result<SuggestionBatch> {
            Err(Error::SuggesterUnreachable {
                endpoint: "http://localhost:11434".to_string(),
                source: None,
            })
        }
    }

    fn categorizer() -> Categorizer {
        Categorizer::from_config(&Config::defaults())
    }

    #[test]
    fn test_rule_based_plan_without_suggester() {
        let categorizer = categorizer();
        let planner = Planner::new(&categorizer);

        let records = vec![
            record("photo.jpg", "Images"),
            record("report.pdf", "Documents"),
            record("script.py", "Code"),
        ];
        let (proposal, warning) = planner.plan(1, &records, Path::new("/base"));

        assert!(warning.is_none());
        assert_eq!(proposal.files().len(), 3);
        assert!((proposal.confidence() - 0.75).abs() < 1e-9);
        assert_eq!(proposal.reasoning(), "Rule-based organization");
        assert_eq!(
            proposal.files()[0].destination,
            PathBuf::from("/base/Images/photo.jpg")
        );
        assert_eq!(
            proposal.files()[1].destination,
            PathBuf::from("/base/Documents/report.pdf")
        );
        assert_eq!(
            proposal.files()[2].destination,
            PathBuf::from("/base/Code/script.py")
        );
    }

    #[test]
    fn test_destination_collision_gets_numbered() {
        let categorizer = categorizer();
        let planner = Planner::new(&categorizer);

        let mut a = record("notes.txt", "Documents");
        a.path = PathBuf::from("/inbox/a/notes.txt");
        let mut b = record("notes.txt", "Documents");
        b.path = PathBuf::from("/inbox/b/notes.txt");

        let (proposal, _) = planner.plan(1, &[a, b], Path::new("/base"));
        let destinations: Vec<&PathBuf> =
            proposal.files().iter().map(|f| &f.destination).collect();

        assert_eq!(destinations[0], &PathBuf::from("/base/Documents/notes.txt"));
        assert_eq!(
            destinations[1],
            &PathBuf::from("/base/Documents/notes (1).txt")
        );
    }

    #[test]
    fn test_suggester_overrides_rule_destination() {
        let categorizer = categorizer();
        let suggester = StaticSuggester(SuggestionBatch {
            suggestions: vec![Suggestion {
                file: "report.pdf".to_string(),
                destination: "Documents/Work/Acme".to_string(),
                reasoning: None,
                confidence: Some(88),
            }],
            overall_confidence: 90,
        });
        let planner = Planner::new(&categorizer).with_suggester(Some(&suggester));

        let records = vec![
            record("report.pdf", "Documents"),
            record("photo.jpg", "Images"),
        ];
        let (proposal, warning) = planner.plan(1, &records, Path::new("/base"));

        assert!(warning.is_none());
        assert!((proposal.confidence() - 0.9).abs() < 1e-9);
        assert_eq!(proposal.reasoning(), "AI-generated organization plan");
        assert_eq!(
            proposal.files()[0].destination,
            PathBuf::from("/base/Documents/Work/Acme/report.pdf")
        );
        // No suggestion for photo.jpg: rule-based destination kept
        assert_eq!(
            proposal.files()[1].destination,
            PathBuf::from("/base/Images/photo.jpg")
        );
    }

    #[test]
    fn test_suggester_failure_falls_back_with_warning() {
        let categorizer = categorizer();
        let suggester = FailingSuggester;
        let planner = Planner::new(&categorizer).with_suggester(Some(&suggester));

        let records = vec![record("report.pdf", "Documents")];
        let (proposal, warning) = planner.plan(1, &records, Path::new("/base"));

        assert!((proposal.confidence() - 0.75).abs() < 1e-9);
        assert_eq!(proposal.reasoning(), "Rule-based organization");
        assert_eq!(warning.unwrap().code(), "E001");
        assert_eq!(proposal.files().len(), 1);
    }

    #[test]
    fn test_escaping_suggestion_is_rejected() {
        let categorizer = categorizer();
        for bad in ["../outside", "/etc", "a/../../b", ""] {
            let suggester = StaticSuggester(SuggestionBatch {
                suggestions: vec![Suggestion {
                    file: "report.pdf".to_string(),
                    destination: bad.to_string(),
                    reasoning: None,
                    confidence: None,
                }],
                overall_confidence: 80,
            });
            let planner = Planner::new(&categorizer).with_suggester(Some(&suggester));
            let (proposal, _) =
                planner.plan(1, &[record("report.pdf", "Documents")], Path::new("/base"));

            assert_eq!(
                proposal.files()[0].destination,
                PathBuf::from("/base/Documents/report.pdf"),
                "suggestion {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_learned_pattern_catches_unmatched_extension() {
        let categorizer = categorizer();
        let mut learned = HashMap::new();
        learned.insert("sav".to_string(), "Games".to_string());
        let planner = Planner::new(&categorizer).with_learned_patterns(learned);

        let mut rec = record("quest.sav", OTHER_CATEGORY);
        rec.path = PathBuf::from("/inbox/quest.sav");
        let (proposal, _) = planner.plan(1, &[rec], Path::new("/base"));

        assert_eq!(
            proposal.files()[0].destination,
            PathBuf::from("/base/Games/quest.sav")
        );
    }

    #[test]
    fn test_plan_json_round_trip() {
        let categorizer = categorizer();
        let planner = Planner::new(&categorizer);
        let records = vec![record("report.pdf", "Documents")];
        let (proposal, _) = planner.plan(7, &records, Path::new("/base"));

        let json = proposal.to_plan_json().unwrap();
        let row = ProposalRow {
            id: Some(3),
            scan_id: 7,
            plan_json: json,
            confidence: proposal.confidence(),
            timestamp: None,
            approved: true,
            rolled_back: false,
            backups_enabled: None,
        };

        let restored = Proposal::from_row(&row).unwrap();
        assert_eq!(restored.id(), Some(3));
        assert_eq!(restored.scan_id(), 7);
        assert_eq!(restored.files(), proposal.files());
        assert_eq!(restored.reasoning(), proposal.reasoning());
    }

    #[test]
    fn test_plan_json_contains_spec_shape() {
        let categorizer = categorizer();
        let planner = Planner::new(&categorizer);
        let mut rec = record("secret.txt", "Documents");
        rec.risk_score = 95;
        let (proposal, _) = planner.plan(1, &[rec], Path::new("/base"));

        let json: serde_json::Value =
            serde_json::from_str(&proposal.to_plan_json().unwrap()).unwrap();
        assert_eq!(json["files"][0]["risk_level"], "high");
        assert_eq!(json["files"][0]["risk_score"], 95);
        assert!(json["files"][0]["source"].is_string());
        assert!(json["confidence"].is_number());
        assert!(json["reasoning"].is_string());
    }
}
