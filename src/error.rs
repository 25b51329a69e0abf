// src/error.rs

//! Error types for curator
//!
//! Every surfaced error carries a stable code (E001-E006). Codes are
//! immutable once released: new semantics get new codes, existing codes are
//! never repurposed. Documentation links and support workflows depend on
//! this.

use std::path::PathBuf;
use thiserror::Error;

/// Base URL for help articles, overridable for self-hosted docs
pub fn help_base_url() -> String {
    std::env::var("CURATOR_HELP_BASE_URL")
        .unwrap_or_else(|_| "https://github.com/curator-project/curator/wiki".to_string())
}

/// Result type used throughout the curator library
pub type Result<T> = std::result::Result<T, Error>;

/// All errors surfaced by the curator core
#[derive(Debug, Error)]
pub enum Error {
    /// E001: could not reach the suggester endpoint
    #[error("Connection to suggester at {endpoint} failed")]
    SuggesterUnreachable {
        endpoint: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// E002: the suggester responded but the response was unusable
    #[error("Suggester failed: {reason}")]
    Suggester { reason: String },

    /// E003: filesystem error scoped to one operation and path
    #[error("File system error during {operation}: {path}")]
    Filesystem {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// E003: filesystem error with no specific path context
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// E004: configuration is invalid, refuse to start the operation
    #[error("Configuration error for '{key}': {issue}")]
    Config { key: String, issue: String },

    /// E005: a previous scan did not run to completion
    #[error("Scan #{scan_id} was interrupted ({processed}/{total} files)")]
    ScanInterrupted {
        scan_id: i64,
        processed: u64,
        total: u64,
    },

    /// E006: the audit store rejected a write; no further moves may run
    #[error("Audit store error during {operation}")]
    Audit {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// E006: raw database errors map to the audit store code
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),

    /// E006: serialization failures surface in audit/persist contexts
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Convenience constructor for path-scoped filesystem errors
    pub fn fs(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Convenience constructor for audit store errors
    pub fn audit(
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Audit {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// The stable error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::SuggesterUnreachable { .. } => "E001",
            Self::Suggester { .. } => "E002",
            Self::Filesystem { .. } | Self::Io(_) => "E003",
            Self::Config { .. } => "E004",
            Self::ScanInterrupted { .. } => "E005",
            Self::Audit { .. } | Self::Sql(_) | Self::Json(_) => "E006",
        }
    }

    /// True when the operation can continue on a fallback path
    ///
    /// Suggester failures degrade to rule-based planning. Everything else
    /// either skips the file (E003, handled inside loops) or aborts the
    /// command.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SuggesterUnreachable { .. } | Self::Suggester { .. })
    }

    /// Suggested next steps for the user, most useful first
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            Self::SuggesterUnreachable { endpoint, .. } => vec![
                "The system will fall back to rule-based organization".to_string(),
                format!("Check that the suggester endpoint is reachable: {endpoint}"),
                "Review ai.models in config.json".to_string(),
            ],
            Self::Suggester { .. } => vec![
                "The system will fall back to rule-based organization".to_string(),
                "Try a different model via: curator config --set-provider".to_string(),
            ],
            Self::Filesystem { path, .. } => vec![
                format!("Check permissions for: {}", path.display()),
                "Ensure sufficient disk space".to_string(),
                "Verify the path is accessible".to_string(),
            ],
            Self::Io(_) => vec![
                "Check file and directory permissions".to_string(),
                "Ensure sufficient disk space".to_string(),
            ],
            Self::Config { key, .. } => vec![
                format!("Check the configuration for '{key}'"),
                "Edit the config with: curator config --edit".to_string(),
            ],
            Self::ScanInterrupted { .. } => vec![
                "Continue with a fresh scan, or enter safe mode for diagnostics".to_string(),
            ],
            Self::Audit { .. } | Self::Sql(_) | Self::Json(_) => vec![
                "Check permissions on ~/.organizer/audit.db".to_string(),
                "Run in safe mode to inspect the audit trail".to_string(),
            ],
        }
    }

    /// Help article for this error class, if one exists
    pub fn help_url(&self) -> Option<String> {
        let page = match self.code() {
            "E001" | "E002" => "Suggester-Errors",
            "E003" => "Filesystem-Errors",
            "E004" => "Configuration",
            "E005" => "Recovery-Mode",
            "E006" => "Audit-Store-Errors",
            _ => return None,
        };
        Some(format!("{}/{}", help_base_url(), page))
    }

    /// Technical detail chain, shown only when the caller asked for it
    pub fn technical_details(&self) -> String {
        use std::error::Error as _;
        let mut out = format!("{self}");
        let mut cause = self.source();
        while let Some(err) = cause {
            out.push_str(&format!("\n  caused by: {err}"));
            cause = err.source();
        }
        out
    }
}

/// Render an error for console display in the standard shape:
/// code, message, suggestions, optional help link, optional technical detail.
pub fn format_for_display(err: &Error, show_technical: bool) -> String {
    let mut lines = vec![format!("Error [{}]: {}", err.code(), err)];

    let suggestions = err.recovery_suggestions();
    if !suggestions.is_empty() {
        lines.push(String::new());
        lines.push("Suggested actions:".to_string());
        for s in suggestions {
            lines.push(format!("  - {s}"));
        }
    }

    if let Some(url) = err.help_url() {
        lines.push(String::new());
        lines.push(format!("More help: {url}"));
    }

    if show_technical {
        lines.push(String::new());
        lines.push("Technical details:".to_string());
        lines.push(err.technical_details());
    }

    lines.join("\n")
}
