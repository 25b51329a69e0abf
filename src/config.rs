// src/config.rs

//! Configuration management
//!
//! Configuration lives in `~/.organizer/config.json` and is addressed with
//! dot-notation keys (`backup.skip_large_files_mb`). Unknown keys fall back
//! to the caller's default; `validate` rejects values that would make an
//! operation unsafe before it starts.

use crate::{Error, Result};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const ORGANIZER_DIR_NAME: &str = ".organizer";
pub const CONFIG_FILE_NAME: &str = "config.json";

/// The organizer state directory (`~/.organizer` unless overridden)
///
/// `CURATOR_ORGANIZER_DIR` relocates the whole tree, which tests and
/// sandboxed installs rely on.
pub fn organizer_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CURATOR_ORGANIZER_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(ORGANIZER_DIR_NAME)
}

/// Configuration store with dot-notation access
#[derive(Debug, Clone)]
pub struct Config {
    path: PathBuf,
    values: Value,
}

impl Config {
    /// Load from the default location, creating it with defaults if absent
    pub fn load_default() -> Result<Self> {
        Self::load_from(organizer_dir().join(CONFIG_FILE_NAME))
    }

    /// Load from an explicit path, creating it with defaults if absent
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| Error::fs("read config", path.clone(), e))?;
            serde_json::from_str(&raw).map_err(|e| Error::Config {
                key: path.display().to_string(),
                issue: format!("invalid JSON: {e}"),
            })?
        } else {
            let config = Self {
                path: path.clone(),
                values: Self::default_values(),
            };
            config.save()?;
            config.values
        };

        Ok(Self { path, values })
    }

    /// An in-memory config with default values, never written to disk
    pub fn defaults() -> Self {
        Self {
            path: PathBuf::new(),
            values: Self::default_values(),
        }
    }

    /// Path this config was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The full configuration tree
    pub fn values(&self) -> &Value {
        &self.values
    }

    /// Persist the current values as pretty JSON
    pub fn save(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::fs("create config directory", parent.to_path_buf(), e))?;
        }
        let rendered = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, rendered)
            .map_err(|e| Error::fs("write config", self.path.clone(), e))
    }

    /// Raw value lookup by dot-notation key
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut current = &self.values;
        for part in key.split('.') {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    /// Set a value by dot-notation key and persist
    ///
    /// Intermediate objects are created as needed.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.is_empty() || parts.iter().any(|p| p.is_empty()) {
            return Err(Error::Config {
                key: key.to_string(),
                issue: "empty key segment".to_string(),
            });
        }

        let mut current = &mut self.values;
        for part in &parts[..parts.len() - 1] {
            if !current.is_object() {
                return Err(Error::Config {
                    key: key.to_string(),
                    issue: format!("'{part}' is not an object"),
                });
            }
            current = current
                .as_object_mut()
                .expect("checked above")
                .entry(part.to_string())
                .or_insert_with(|| json!({}));
        }

        match current.as_object_mut() {
            Some(map) => {
                map.insert(parts[parts.len() - 1].to_string(), value);
            }
            None => {
                return Err(Error::Config {
                    key: key.to_string(),
                    issue: "parent is not an object".to_string(),
                })
            }
        }

        self.save()
    }

    /// Reject configurations that would make operations unsafe (E004)
    pub fn validate(&self) -> Result<()> {
        let threshold = self.get_u64("preferences.auto_approve_threshold", 30);
        if threshold > 100 {
            return Err(Error::Config {
                key: "preferences.auto_approve_threshold".to_string(),
                issue: format!("must be between 0 and 100, got {threshold}"),
            });
        }

        if self.get_u64("backup.skip_large_files_mb", 500) == 0 {
            return Err(Error::Config {
                key: "backup.skip_large_files_mb".to_string(),
                issue: "must be greater than 0".to_string(),
            });
        }

        if let Some(rules) = self.get("rules") {
            if !rules.is_object() {
                return Err(Error::Config {
                    key: "rules".to_string(),
                    issue: "must be an object of category rules".to_string(),
                });
            }
        }

        Ok(())
    }

    /// The full default configuration tree
    pub fn default_values() -> Value {
        json!({
            "version": "1.0.0",
            "ai": {
                "primary": "ollama",
                "fallback": "rule-based",
                "models": {
                    "ollama": {
                        "endpoint": "http://localhost:11434",
                        "model": "llama3.3",
                        "fallback_model": "qwen2.5",
                        "timeout": 30
                    }
                }
            },
            "rules": {
                "documents": {
                    "extensions": [".pdf", ".doc", ".docx", ".txt", ".md"],
                    "folder": "Documents"
                },
                "images": {
                    "extensions": [".jpg", ".jpeg", ".png", ".gif", ".bmp", ".svg"],
                    "folder": "Images"
                },
                "code": {
                    "extensions": [".py", ".js", ".java", ".cpp", ".c", ".h", ".go", ".rs"],
                    "folder": "Code"
                },
                "videos": {
                    "extensions": [".mp4", ".avi", ".mkv", ".mov", ".wmv"],
                    "folder": "Videos"
                },
                "audio": {
                    "extensions": [".mp3", ".wav", ".flac", ".aac", ".ogg"],
                    "folder": "Audio"
                },
                "archives": {
                    "extensions": [".zip", ".rar", ".7z", ".tar", ".gz", ".bz2"],
                    "folder": "Archives"
                },
                "finance": {
                    "extensions": [".xlsx", ".xls", ".csv"],
                    "folder": "Finance",
                    "keywords": ["invoice", "receipt", "statement", "tax", "payment"]
                }
            },
            "preferences": {
                "create_date_folders": false,
                "dry_run": false,
                "auto_approve_threshold": 30,
                "ignore_hidden": true
            },
            "backup": {
                "enabled": true,
                "max_size_mb": 5000,
                "skip_large_files_mb": 500,
                "retention_days": 30
            },
            "privacy": {
                "redact_sensitive_in_logs": true
            },
            "watch": {
                "enabled": false,
                "batch_interval_seconds": 300
            },
            "learning": {
                "enabled": true,
                "suggest_threshold": 10,
                "min_confidence": 0.80
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_have_expected_keys() {
        let config = Config::defaults();
        assert_eq!(config.get_u64("preferences.auto_approve_threshold", 0), 30);
        assert!(config.get_bool("backup.enabled", false));
        assert!(!config.get_bool("preferences.create_date_folders", true));
        assert_eq!(
            config.get_str("ai.models.ollama.endpoint", ""),
            "http://localhost:11434"
        );
    }

    #[test]
    fn test_missing_key_falls_back_to_default() {
        let config = Config::defaults();
        assert_eq!(config.get_u64("no.such.key", 42), 42);
        assert!(config.get("no.such.key").is_none());
    }

    #[test]
    fn test_set_then_get_round_trips() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::load_from(temp.path().join("config.json")).unwrap();

        config
            .set("preferences.auto_approve_threshold", json!(55))
            .unwrap();
        assert_eq!(config.get_u64("preferences.auto_approve_threshold", 0), 55);

        // A fresh load sees the persisted value
        let reloaded = Config::load_from(temp.path().join("config.json")).unwrap();
        assert_eq!(reloaded.get_u64("preferences.auto_approve_threshold", 0), 55);
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::load_from(temp.path().join("config.json")).unwrap();

        config.set("ai.models.local.endpoint", json!("http://127.0.0.1:8080")).unwrap();
        assert_eq!(
            config.get_str("ai.models.local.endpoint", ""),
            "http://127.0.0.1:8080"
        );
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::load_from(temp.path().join("config.json")).unwrap();
        config
            .set("preferences.auto_approve_threshold", json!(150))
            .unwrap();

        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "E004");
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert_eq!(err.code(), "E004");
    }

    #[test]
    fn test_first_load_writes_defaults_to_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        let _ = Config::load_from(&path).unwrap();
        assert!(path.exists());
    }
}
