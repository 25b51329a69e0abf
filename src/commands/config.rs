// src/commands/config.rs

//! Config command

use crate::commands::AppContext;
use crate::config::Config;
use crate::{Error, Result};
use serde_json::json;
use std::process::Command;

pub fn cmd_config(
    show: bool,
    set_provider: Option<String>,
    model: Option<String>,
    edit: bool,
) -> Result<i32> {
    // Load without validation: the whole point of --edit may be to fix a
    // broken value
    let mut config = Config::load_default()?;

    if let Some(provider) = set_provider {
        config.set("ai.primary", json!(provider.clone()))?;
        if let Some(model) = model {
            config.set(&format!("ai.models.{provider}.model"), json!(model))?;
        }
        println!("Suggester provider set to '{provider}'.");
        return Ok(0);
    }

    if edit {
        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
        let status = Command::new(&editor)
            .arg(config.path())
            .status()
            .map_err(|e| Error::fs("launch editor", config.path().to_path_buf(), e))?;
        if !status.success() {
            eprintln!("Editor exited with {status}.");
            return Ok(2);
        }

        // Reload and check what the user wrote
        let edited = Config::load_default()?;
        match edited.validate() {
            Ok(()) => println!("Configuration updated."),
            Err(err) => {
                eprintln!("Edited configuration is invalid: {err}");
                return Ok(2);
            }
        }
        return Ok(0);
    }

    // --show (also the default action)
    let _ = show;
    let ctx = AppContext::load()?;
    println!(
        "{}",
        serde_json::to_string_pretty(ctx.config.values()).unwrap_or_default()
    );
    Ok(0)
}
