// src/categorize.rs

//! Four-level file categorization
//!
//! Level 1 (type) comes from the configured extension rules, level 2
//! (context) from a small path lexicon, level 3 (time) from the file mtime,
//! level 4 (smart) from the leading token of the filename. Categorization is
//! a pure function of `(path, preview, metadata, mtime, config)` — the same
//! inputs always produce the same tuple.

use crate::config::Config;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Fallback type category when no rule matches
pub const OTHER_CATEGORY: &str = "Other";
/// Context category that is omitted from built paths
pub const GENERAL_CONTEXT: &str = "General";

/// Filename prefixes stripped before smart-token extraction
const STRIP_PREFIXES: &[&str] = &["draft_", "final_", "copy_", "new_"];

/// Context lexicon, in priority order
const CONTEXT_LEXICON: &[(&str, &[&str])] = &[
    ("Work", &["work", "office", "business", "meeting"]),
    ("Personal", &["personal", "private"]),
    ("Projects", &["project", "projects"]),
    ("Clients", &["client", "customer"]),
];

/// The (type, context, time, smart) tuple for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categories {
    /// L1: Documents, Images, Code, ...
    pub kind: String,
    /// L2: Work, Personal, Projects, Clients, or General
    pub context: String,
    /// L3: `YYYY` or `YYYY-MM-DD`
    pub time: String,
    /// L4: leading filename token, empty for single-token names
    pub smart: String,
}

/// One categorization rule from the config table
#[derive(Debug, Clone)]
pub struct Rule {
    pub folder: String,
    pub extensions: Vec<String>,
    /// Non-empty keywords make this a keyword rule: the extension must
    /// match AND a keyword must appear in the filename or preview
    pub keywords: Vec<String>,
}

impl Rule {
    fn matches_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e == ext)
    }
}

/// Deterministic rule-table categorizer
#[derive(Debug, Clone)]
pub struct Categorizer {
    /// Keyword rules, checked before plain extension rules
    keyword_rules: Vec<Rule>,
    extension_rules: Vec<Rule>,
    create_date_folders: bool,
}

impl Categorizer {
    /// Build the rule table from `rules.*` in the config
    ///
    /// Rule iteration order follows the config map order, which serde_json
    /// keeps sorted, so categorization stays deterministic across runs.
    pub fn from_config(config: &Config) -> Self {
        let mut keyword_rules = Vec::new();
        let mut extension_rules = Vec::new();

        if let Some(rules) = config.get("rules").and_then(|v| v.as_object()) {
            for (name, rule) in rules {
                let folder = rule
                    .get("folder")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| capitalize(name));
                let extensions = string_list(rule.get("extensions"));
                let keywords = string_list(rule.get("keywords"));

                let parsed = Rule {
                    folder,
                    extensions,
                    keywords,
                };
                if parsed.keywords.is_empty() {
                    extension_rules.push(parsed);
                } else {
                    keyword_rules.push(parsed);
                }
            }
        }

        Self {
            keyword_rules,
            extension_rules,
            create_date_folders: config.get_bool("preferences.create_date_folders", false),
        }
    }

    pub fn create_date_folders(&self) -> bool {
        self.create_date_folders
    }

    /// Categorize one file into the 4-level tuple
    pub fn categorize(
        &self,
        path: &Path,
        preview: &str,
        mtime: Option<SystemTime>,
    ) -> Categories {
        Categories {
            kind: self.categorize_by_type(path, preview),
            context: categorize_by_context(path),
            time: self.categorize_by_time(mtime),
            smart: categorize_smart(path),
        }
    }

    fn categorize_by_type(&self, path: &Path, preview: &str) -> String {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!(".{}", ext.to_ascii_lowercase()),
            None => return OTHER_CATEGORY.to_string(),
        };
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let preview = preview.to_ascii_lowercase();

        for rule in &self.keyword_rules {
            if rule.matches_extension(&ext)
                && rule
                    .keywords
                    .iter()
                    .any(|kw| name.contains(kw) || preview.contains(kw))
            {
                return rule.folder.clone();
            }
        }

        for rule in &self.extension_rules {
            if rule.matches_extension(&ext) {
                return rule.folder.clone();
            }
        }

        OTHER_CATEGORY.to_string()
    }

    fn categorize_by_time(&self, mtime: Option<SystemTime>) -> String {
        let stamp: DateTime<Local> = mtime.map(DateTime::from).unwrap_or_else(Local::now);
        if self.create_date_folders {
            stamp.format("%Y-%m-%d").to_string()
        } else {
            stamp.format("%Y").to_string()
        }
    }

    /// Assemble the destination directory from category levels
    ///
    /// `General` context is dropped, and the time level only appears when
    /// date folders are enabled.
    pub fn build_path(&self, base: &Path, categories: &Categories) -> PathBuf {
        let mut out = base.to_path_buf();

        if !categories.kind.is_empty() {
            out.push(&categories.kind);
        }
        if !categories.context.is_empty() && categories.context != GENERAL_CONTEXT {
            out.push(&categories.context);
        }
        if self.create_date_folders && !categories.time.is_empty() {
            out.push(&categories.time);
        }
        if !categories.smart.is_empty() {
            out.push(&categories.smart);
        }

        out
    }
}

fn categorize_by_context(path: &Path) -> String {
    let haystack = path.display().to_string().to_ascii_lowercase();
    for (context, words) in CONTEXT_LEXICON {
        if words.iter().any(|w| haystack.contains(w)) {
            return context.to_string();
        }
    }
    GENERAL_CONTEXT.to_string()
}

fn categorize_smart(path: &Path) -> String {
    let stem = match path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) => stem,
        None => return String::new(),
    };

    let mut name = stem;
    for prefix in STRIP_PREFIXES {
        if name.to_ascii_lowercase().starts_with(prefix) {
            name = &name[prefix.len()..];
            break;
        }
    }

    for sep in ['_', '-'] {
        let mut parts = name.split(sep);
        if let (Some(first), Some(_)) = (parts.next(), parts.next()) {
            return capitalize(first);
        }
    }

    String::new()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_ascii_lowercase())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn categorizer() -> Categorizer {
        Categorizer::from_config(&Config::defaults())
    }

    #[test]
    fn test_type_from_extension_rules() {
        let c = categorizer();
        assert_eq!(
            c.categorize(Path::new("/tmp/photo.jpg"), "", None).kind,
            "Images"
        );
        assert_eq!(
            c.categorize(Path::new("/tmp/report.pdf"), "", None).kind,
            "Documents"
        );
        assert_eq!(
            c.categorize(Path::new("/tmp/script.py"), "", None).kind,
            "Code"
        );
        assert_eq!(
            c.categorize(Path::new("/tmp/mystery.qqq"), "", None).kind,
            "Other"
        );
    }

    #[test]
    fn test_finance_needs_extension_and_keyword() {
        let c = categorizer();
        // Keyword in the filename
        assert_eq!(
            c.categorize(Path::new("/tmp/invoice_march.xlsx"), "", None).kind,
            "Finance"
        );
        // Keyword in the preview
        assert_eq!(
            c.categorize(Path::new("/tmp/data.csv"), "tax statement 2024", None)
                .kind,
            "Finance"
        );
        // Finance extension without a keyword does not match any rule
        assert_eq!(
            c.categorize(Path::new("/tmp/data.csv"), "temperature readings", None)
                .kind,
            "Other"
        );
        // A keyword without a finance extension is not finance
        assert_eq!(
            c.categorize(Path::new("/tmp/invoice.pdf"), "", None).kind,
            "Documents"
        );
    }

    #[test]
    fn test_context_lexicon_priority() {
        assert_eq!(categorize_by_context(Path::new("/tmp/office/a.txt")), "Work");
        assert_eq!(
            categorize_by_context(Path::new("/tmp/private/a.txt")),
            "Personal"
        );
        assert_eq!(
            categorize_by_context(Path::new("/tmp/project-x/a.txt")),
            "Projects"
        );
        assert_eq!(
            categorize_by_context(Path::new("/tmp/customer/a.txt")),
            "Clients"
        );
        assert_eq!(categorize_by_context(Path::new("/tmp/misc/a.txt")), "General");
        // Work wins over later contexts
        assert_eq!(
            categorize_by_context(Path::new("/tmp/work/client/a.txt")),
            "Work"
        );
    }

    #[test]
    fn test_smart_token_from_filename() {
        assert_eq!(
            categorize_smart(Path::new("/tmp/ProjectX_report.pdf")),
            "Projectx"
        );
        assert_eq!(
            categorize_smart(Path::new("/tmp/draft_acme-proposal.doc")),
            "Acme"
        );
        assert_eq!(categorize_smart(Path::new("/tmp/photo.jpg")), "");
    }

    #[test]
    fn test_build_path_drops_general_and_time() {
        let c = categorizer();
        let categories = Categories {
            kind: "Documents".to_string(),
            context: "General".to_string(),
            time: "2026".to_string(),
            smart: String::new(),
        };
        assert_eq!(
            c.build_path(Path::new("/base"), &categories),
            PathBuf::from("/base/Documents")
        );
    }

    #[test]
    fn test_build_path_with_date_folders() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::load_from(temp.path().join("config.json")).unwrap();
        config
            .set("preferences.create_date_folders", serde_json::json!(true))
            .unwrap();
        let c = Categorizer::from_config(&config);

        let categories = Categories {
            kind: "Documents".to_string(),
            context: "Work".to_string(),
            time: "2026-08-01".to_string(),
            smart: "Acme".to_string(),
        };
        assert_eq!(
            c.build_path(Path::new("/base"), &categories),
            PathBuf::from("/base/Documents/Work/2026-08-01/Acme")
        );
    }

    #[test]
    fn test_categorization_is_deterministic() {
        let c = categorizer();
        let mtime = Some(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000));
        let a = c.categorize(Path::new("/tmp/invoice_acme.xlsx"), "payment due", mtime);
        let b = c.categorize(Path::new("/tmp/invoice_acme.xlsx"), "payment due", mtime);
        assert_eq!(a, b);
    }

    #[test]
    fn test_time_level_formats() {
        let c = categorizer();
        let mtime = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        let year = c.categorize(Path::new("/tmp/a.txt"), "", Some(mtime)).time;
        assert_eq!(year.len(), 4);
        assert!(year.chars().all(|c| c.is_ascii_digit()));
    }
}
