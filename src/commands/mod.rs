// src/commands/mod.rs

//! Command implementations
//!
//! One module per subcommand. Commands return a process exit code on the
//! success path: 0 for success, 1 when an execute left failures behind, 2
//! for invalid inputs. Operation-level errors (lock contention, audit
//! store, configuration) propagate as `Err` and are mapped in `main`.

pub mod audit;
pub mod config;
pub mod rollback;
pub mod scan;
pub mod stats;

use crate::config::Config;
use crate::redact::{Redactor, DEFAULT_MIN_TOKEN_LENGTH};
use crate::Result;
use std::path::PathBuf;

/// Shared command bootstrap: organizer dir, validated config, log redactor
pub struct AppContext {
    pub organizer_dir: PathBuf,
    pub config: Config,
    pub redactor: Redactor,
}

impl AppContext {
    pub fn load() -> Result<Self> {
        let organizer_dir = crate::config::organizer_dir();
        let config = Config::load_default()?;
        config.validate()?;

        let redactor = Redactor::new(
            config.get_bool("privacy.redact_sensitive_in_logs", true),
            DEFAULT_MIN_TOKEN_LENGTH,
        );

        Ok(Self {
            organizer_dir,
            config,
            redactor,
        })
    }
}
