// src/redact.rs

//! Sensitive-data detection and masking
//!
//! Pure string transforms. The same patterns back both the log redaction
//! (`redact`) and the risk assessor (`detect`). Masks are chosen so that
//! re-running `redact` over already-redacted text changes nothing.

use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

/// Default minimum length for credential-like token detection
///
/// High on purpose: shorter alphanumeric runs (git short hashes, part
/// numbers) are overwhelmingly false positives.
pub const DEFAULT_MIN_TOKEN_LENGTH: usize = 40;

static SSN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static CARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b").unwrap());
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}[-.]\d{3}[-.]\d{4}\b").unwrap());
static PASSWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(password|passwd|pwd)[\s:=]+\S+").unwrap());
static HOME_UNIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/home/[^/]+/").unwrap());
static HOME_MAC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Users/[^/]+/").unwrap());
static HOME_WIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)C:\\Users\\[^\\]+\\").unwrap());

/// Categories of sensitive content the detector can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SensitiveKind {
    Ssn,
    Card,
    Email,
    Phone,
    ApiKey,
    Password,
}

impl SensitiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ssn => "SSN",
            Self::Card => "CreditCard",
            Self::Email => "Email",
            Self::Phone => "Phone",
            Self::ApiKey => "APIKey",
            Self::Password => "Password",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Ssn => "SSN pattern detected",
            Self::Card => "Credit card pattern detected",
            Self::Email => "Email address detected",
            Self::Phone => "Phone number detected",
            Self::ApiKey => "Potential API key detected",
            Self::Password => "Password field detected",
        }
    }
}

impl fmt::Display for SensitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Masks sensitive data in text; a disabled redactor is the identity
#[derive(Debug, Clone)]
pub struct Redactor {
    enabled: bool,
    token: Regex,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(true, DEFAULT_MIN_TOKEN_LENGTH)
    }
}

impl Redactor {
    pub fn new(enabled: bool, min_token_length: usize) -> Self {
        let token = Regex::new(&format!(r"\b[A-Za-z0-9]{{{min_token_length},}}\b"))
            .expect("token pattern is statically valid");
        Self { enabled, token }
    }

    /// A redactor that passes text through unchanged
    pub fn disabled() -> Self {
        Self::new(false, DEFAULT_MIN_TOKEN_LENGTH)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Mask every known sensitive pattern in `text`
    pub fn redact(&self, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }

        let text = SSN.replace_all(text, "***-**-****");
        let text = CARD.replace_all(&text, "****-****-****-****");
        let text = EMAIL.replace_all(&text, |caps: &regex::Captures<'_>| {
            match caps[0].split_once('@') {
                Some((_, domain)) => format!("****@{domain}"),
                None => "****".to_string(),
            }
        });
        let text = PHONE.replace_all(&text, "***-***-****");
        let text = self.token.replace_all(&text, "****");
        let text = PASSWORD.replace_all(&text, "$1: ****");
        let text = HOME_UNIX.replace_all(&text, "/home/****/");
        let text = HOME_MAC.replace_all(&text, "/Users/****/");
        let text = HOME_WIN.replace_all(&text, "C:\\Users\\****\\");
        text.into_owned()
    }

    /// Mask a filesystem path for log output
    pub fn redact_path(&self, path: &Path) -> String {
        self.redact(&path.display().to_string())
    }

    /// Report which sensitive categories appear in `text`
    ///
    /// Detection runs even when masking is disabled; risk scoring must not
    /// depend on a privacy preference. The order is fixed so downstream
    /// reason lists are deterministic.
    pub fn detect(&self, text: &str) -> Vec<SensitiveKind> {
        let mut found = Vec::new();
        if SSN.is_match(text) {
            found.push(SensitiveKind::Ssn);
        }
        if CARD.is_match(text) {
            found.push(SensitiveKind::Card);
        }
        if EMAIL.is_match(text) {
            found.push(SensitiveKind::Email);
        }
        if PHONE.is_match(text) {
            found.push(SensitiveKind::Phone);
        }
        if self.token.is_match(text) {
            found.push(SensitiveKind::ApiKey);
        }
        if PASSWORD.is_match(text) {
            found.push(SensitiveKind::Password);
        }
        found
    }
}
