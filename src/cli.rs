// src/cli.rs
//! CLI definitions for curator
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "curator")]
#[command(author = "Curator Project")]
#[command(version)]
#[command(about = "Organize files with audited, reversible move proposals", long_about = None)]
pub struct Cli {
    /// Include technical details when printing errors
    #[arg(long, global = true)]
    pub show_technical_details: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a directory, propose a plan, and (after approval) execute it
    Scan {
        /// Directory to organize
        path: PathBuf,

        /// Plan and report without touching any file
        #[arg(long)]
        dry_run: bool,

        /// Non-interactive: auto-approve within the risk threshold,
        /// otherwise report and exit without executing
        #[arg(long)]
        batch: bool,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Override preferences.auto_approve_threshold (0-100)
        #[arg(long, value_name = "N")]
        auto_approve_threshold: Option<u8>,

        /// Read-only diagnostics: no suggester calls, no executor writes
        #[arg(long)]
        safe_mode: bool,
    },

    /// Roll back an executed proposal
    Rollback {
        /// Roll back the most recent reversible proposal
        #[arg(long)]
        last: bool,

        /// Roll back a specific proposal by id
        #[arg(long, value_name = "ID")]
        proposal: Option<i64>,

        /// List executed proposals and their rollback state
        #[arg(long)]
        show_history: bool,
    },

    /// Show or modify configuration
    Config {
        /// Print the full configuration
        #[arg(long)]
        show: bool,

        /// Select the suggester provider
        #[arg(long, value_name = "PROVIDER")]
        set_provider: Option<String>,

        /// Model to use with --set-provider
        #[arg(long, value_name = "MODEL")]
        model: Option<String>,

        /// Open the configuration in $EDITOR
        #[arg(long)]
        edit: bool,
    },

    /// Inspect the audit transition stream
    Audit {
        /// Show only the last N transitions
        #[arg(long, value_name = "N")]
        last: Option<usize>,

        /// Show only transitions from one day (YYYY-MM-DD)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<String>,

        /// Show only transitions mentioning a file name
        #[arg(long, value_name = "NAME")]
        file: Option<String>,
    },

    /// Show usage statistics from the audit store
    Stats {
        /// One-line summary only
        #[arg(long)]
        summary: bool,
    },
}
