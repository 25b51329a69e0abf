// src/main.rs

use clap::Parser;
use curator::cli::{Cli, Commands};
use curator::commands;
use curator::config::organizer_dir;
use curator::recovery::RecoveryManager;
use curator::redact::{Redactor, DEFAULT_MIN_TOKEN_LENGTH};
use curator::{format_for_display, Error};
use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Scan {
            path,
            dry_run,
            batch,
            recursive,
            auto_approve_threshold,
            safe_mode,
        }) => commands::scan::cmd_scan(
            &path,
            dry_run,
            batch,
            recursive,
            auto_approve_threshold,
            safe_mode,
        ),
        Some(Commands::Rollback {
            last,
            proposal,
            show_history,
        }) => commands::rollback::cmd_rollback(last, proposal, show_history),
        Some(Commands::Config {
            show,
            set_provider,
            model,
            edit,
        }) => commands::config::cmd_config(show, set_provider, model, edit),
        Some(Commands::Audit { last, date, file }) => {
            commands::audit::cmd_audit(last, date, file)
        }
        Some(Commands::Stats { summary }) => commands::stats::cmd_stats(summary),
        None => {
            println!("curator v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'curator --help' for usage information");
            Ok(0)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{}", format_for_display(&err, cli.show_technical_details));
            record_crash(&err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

/// E004 means the inputs were bad (exit 2); everything else that escapes a
/// command is an operational failure (exit 1)
fn exit_code_for(err: &Error) -> u8 {
    match err.code() {
        "E004" => 2,
        _ => 1,
    }
}

/// Best-effort crash record; never masks the original error
fn record_crash(err: &Error) {
    if let Ok(recovery) = RecoveryManager::new(
        &organizer_dir(),
        Redactor::new(true, DEFAULT_MIN_TOKEN_LENGTH),
    ) {
        recovery.record_crash(err);
    }
}
