// src/commands/scan.rs

//! Scan command: enumerate → analyze → propose → approve → execute
//!
//! This is the only command that mutates tracked files, so it holds the
//! process lock for its whole run, resolves any interrupted-scan state
//! before touching anything, and keeps the recovery file current while
//! analysis runs.

use crate::audit::AuditStore;
use crate::categorize::Categorizer;
use crate::commands::AppContext;
use crate::db::models::LearningRow;
use crate::db::paths;
use crate::execute::Executor;
use crate::extract::TextExtractor;
use crate::plan::{Planner, Proposal};
use crate::recovery::{ProcessLock, RecoveryManager};
use crate::redact::Redactor;
use crate::risk::RiskAssessor;
use crate::scan::{FileRecord, ScanStats, Scanner};
use crate::suggest::{HttpSuggester, Suggester};
use crate::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{info, warn};

/// Progress updates hit the recovery file at this cadence
const PROGRESS_EVERY: u64 = 1;

static SIGINT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

extern "C" fn on_sigint(_signal: libc::c_int) {
    if let Some(flag) = SIGINT_FLAG.get() {
        flag.store(true, Ordering::SeqCst);
    }
}

/// Install the SIGINT handler and return the flag it sets
fn install_sigint_handler() -> Arc<AtomicBool> {
    let flag = SIGINT_FLAG
        .get_or_init(|| Arc::new(AtomicBool::new(false)))
        .clone();
    let handler = on_sigint as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
    flag
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_scan(
    path: &Path,
    dry_run: bool,
    batch: bool,
    recursive: bool,
    threshold_override: Option<u8>,
    safe_mode_flag: bool,
) -> Result<i32> {
    let ctx = AppContext::load()?;

    if !path.is_dir() {
        eprintln!("Not a directory: {}", path.display());
        return Ok(2);
    }
    let path = path
        .canonicalize()
        .map_err(|e| crate::Error::fs("resolve scan path", path.to_path_buf(), e))?;

    if let Some(threshold) = threshold_override {
        if threshold > 100 {
            eprintln!("--auto-approve-threshold must be between 0 and 100");
            return Ok(2);
        }
    }

    let recovery = RecoveryManager::new(&ctx.organizer_dir, ctx.redactor.clone())?;
    let _lock = ProcessLock::acquire(&paths::lock_file(&ctx.organizer_dir))?;

    let mut safe_mode = safe_mode_flag || recovery.is_safe_mode();
    if safe_mode {
        info!("Running in safe mode: suggester and executor are disabled");
    }

    // Resolve any interrupted scan before doing new work
    if recovery.detect_crash() {
        match resolve_interrupted(&recovery, batch)? {
            InterruptedAction::Continue => {}
            InterruptedAction::SafeMode => safe_mode = true,
            InterruptedAction::Quit => return Ok(0),
        }
    }

    let mut audit = AuditStore::open(&ctx.organizer_dir, ctx.redactor.clone())?;

    // Analysis pipeline. Risk detection uses an always-on redactor: the
    // privacy preference controls log output, not scoring.
    let categorizer = Categorizer::from_config(&ctx.config);
    let risk = RiskAssessor::new(Redactor::default());
    let extractor = TextExtractor;
    let scanner = Scanner::new(&ctx.config, &extractor, &categorizer, &risk);

    let candidates = scanner.enumerate(&path, recursive)?;
    if candidates.is_empty() {
        println!("No files to organize in {}", path.display());
        return Ok(0);
    }

    let scan_id = audit.record_scan(&path, candidates.len())?;
    recovery.start_scan(scan_id, &path, candidates.len() as u64)?;

    let files = analyze_with_progress(&scanner, &candidates, &recovery);
    recovery.complete_scan()?;

    let stats = ScanStats::collect(&files);
    println!(
        "Scanned {}: {} file(s), {:.1} MiB, {} type(s), {} high risk",
        path.display(),
        stats.total,
        stats.total_size as f64 / (1024.0 * 1024.0),
        stats.by_type.len(),
        stats.high_risk
    );

    // Plan: suggester wins when reachable and parseable, rules otherwise
    let suggester = if safe_mode {
        None
    } else {
        HttpSuggester::from_config(&ctx.config)?
    };
    let learned = learned_patterns(&audit, &ctx.config, &files)?;
    let planner = Planner::new(&categorizer)
        .with_suggester(suggester.as_ref().map(|s| s as &dyn Suggester))
        .with_learned_patterns(learned);

    let (mut proposal, suggest_warning) = planner.plan(scan_id, &files, &path);
    if let Some(warning) = suggest_warning {
        eprintln!(
            "Warning [{}]: {warning} - using rule-based organization",
            warning.code()
        );
    }
    audit.record_propose(&mut proposal)?;
    let proposal_id = proposal.id().expect("persisted proposal has an id");

    print_plan(&proposal);

    // Approval
    let threshold = threshold_override
        .unwrap_or(ctx.config.get_u64("preferences.auto_approve_threshold", 30) as u8);
    let max_risk = proposal.max_risk_score();
    let needs_approval = RiskAssessor::requires_approval(max_risk, threshold);

    let approved = if batch || dry_run || !io::stdin().is_terminal() {
        if needs_approval {
            println!(
                "Max risk {max_risk} exceeds threshold {threshold}; approval required. \
                 Re-run without --batch to review."
            );
            false
        } else {
            true
        }
    } else if needs_approval {
        prompt_approval(&proposal, max_risk, threshold)?
    } else {
        println!("Risk within threshold ({max_risk} <= {threshold}); auto-approving.");
        true
    };

    audit.record_approval(proposal_id, approved)?;
    record_learning(&mut audit, &ctx.config, &files, &proposal, &path, approved)?;

    if !approved {
        println!("Proposal {proposal_id} not approved; nothing moved.");
        return Ok(0);
    }

    if safe_mode {
        println!("Safe mode: proposal {proposal_id} approved but not executed.");
        return Ok(0);
    }

    // Execute; SIGINT pauses between files and leaves moved files moved
    let cancel = install_sigint_handler();
    let outcome = Executor::new(&mut audit, ctx.organizer_dir.clone(), &ctx.config)
        .with_dry_run(dry_run)
        .with_cancel(cancel)
        .execute(&proposal)?;

    if outcome.dry_run {
        println!("Dry run: would move {} file(s).", outcome.attempted);
        return Ok(0);
    }

    if outcome.cancelled {
        println!(
            "Interrupted: {} of {} file(s) moved. `curator rollback --last` undoes them.",
            outcome.files_moved, outcome.attempted
        );
        return Ok(1);
    }

    for (source, err) in &outcome.failures {
        eprintln!("Failed: {} ({err})", source.display());
    }

    if outcome.success {
        println!("Moved {} file(s).", outcome.files_moved);
        Ok(0)
    } else {
        println!(
            "Moved {} of {} file(s); see failures above.",
            outcome.files_moved, outcome.attempted
        );
        Ok(1)
    }
}

enum InterruptedAction {
    Continue,
    SafeMode,
    Quit,
}

/// Offer the recovery choices for an interrupted scan
fn resolve_interrupted(recovery: &RecoveryManager, batch: bool) -> Result<InterruptedAction> {
    let state = match recovery.interrupted_scan() {
        Some(state) => state,
        // detect_crash archived a corrupt state file; nothing else to do
        None => return Ok(InterruptedAction::Continue),
    };

    eprintln!("{}", recovery.reconstruct_incident(&state));
    eprintln!();

    if batch || !io::stdin().is_terminal() {
        warn!("Interrupted scan found; continuing with fresh state (batch mode)");
        recovery.complete_scan()?;
        return Ok(InterruptedAction::Continue);
    }

    let mut stdout = io::stdout();
    loop {
        write!(
            stdout,
            "[c]ontinue fresh / [s]afe mode / [v]iew crash details / [q]uit: "
        )?;
        stdout.flush()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;

        match input.trim().to_lowercase().as_str() {
            "c" | "continue" => {
                recovery.complete_scan()?;
                return Ok(InterruptedAction::Continue);
            }
            "s" | "safe" => {
                recovery.enter_safe_mode()?;
                recovery.complete_scan()?;
                return Ok(InterruptedAction::SafeMode);
            }
            "v" | "view" => {
                for crash in recovery.crash_history(5) {
                    eprintln!("{crash}");
                }
            }
            "q" | "quit" | "" => return Ok(InterruptedAction::Quit),
            _ => eprintln!("Unknown option."),
        }
    }
}

/// Run the parallel analysis with a progress bar and recovery updates
fn analyze_with_progress(
    scanner: &Scanner<'_>,
    candidates: &[std::path::PathBuf],
    recovery: &RecoveryManager,
) -> Vec<FileRecord> {
    let bar = ProgressBar::new(candidates.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message("analyzing");

    // Recovery writes are serialized; progress calls arrive from workers
    let recovery = Mutex::new(recovery);
    let files = scanner.analyze(candidates, |done| {
        bar.set_position(done);
        if done % PROGRESS_EVERY == 0 {
            if let Ok(recovery) = recovery.lock() {
                if let Err(err) = recovery.update_progress(done) {
                    warn!("Failed to update scan progress: {err}");
                }
            }
        }
    });

    bar.finish_and_clear();
    files
}

fn print_plan(proposal: &Proposal) {
    println!(
        "\nProposal #{} ({}, confidence {:.0}%):",
        proposal.id().unwrap_or_default(),
        proposal.reasoning(),
        proposal.confidence() * 100.0
    );
    for planned in proposal.files() {
        println!(
            "  {} -> {} [{}]",
            planned.source.display(),
            planned.destination.display(),
            planned.risk_level()
        );
    }
    println!();
}

fn prompt_approval(proposal: &Proposal, max_risk: u8, threshold: u8) -> Result<bool> {
    let mut stdout = io::stdout();
    writeln!(
        stdout,
        "Max risk {max_risk} exceeds the auto-approve threshold {threshold}."
    )?;

    loop {
        write!(
            stdout,
            "Apply this plan of {} move(s)? [y/n]: ",
            proposal.files().len()
        )?;
        stdout.flush()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;

        match input.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" | "" => return Ok(false),
            _ => writeln!(stdout, "Please answer y or n.")?,
        }
    }
}

/// Learned `extension → folder` overrides for files the rule table missed
fn learned_patterns(
    audit: &AuditStore,
    config: &crate::config::Config,
    files: &[FileRecord],
) -> Result<HashMap<String, String>> {
    if !config.get_bool("learning.enabled", true) {
        return Ok(HashMap::new());
    }
    let min_count = config.get_u64("learning.suggest_threshold", 10) as i64;
    let min_confidence = config.get_f64("learning.min_confidence", 0.80);

    let mut learned = HashMap::new();
    for file in files {
        let Some(ext) = file.path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let ext = ext.to_ascii_lowercase();
        if learned.contains_key(&ext) {
            continue;
        }
        let patterns = LearningRow::patterns_for(audit.connection(), &ext, min_count)?;
        if let Some(best) = patterns
            .into_iter()
            .find(|p| p.approval_rate >= min_confidence)
        {
            learned.insert(ext, best.target_folder);
        }
    }
    Ok(learned)
}

/// Record the approval outcome for each planned move
fn record_learning(
    audit: &mut AuditStore,
    config: &crate::config::Config,
    files: &[FileRecord],
    proposal: &Proposal,
    base: &Path,
    approved: bool,
) -> Result<()> {
    if !config.get_bool("learning.enabled", true) {
        return Ok(());
    }

    for (record, planned) in files.iter().zip(proposal.files()) {
        let Some(ext) = record.path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        // First path component under the base is the learned folder
        let folder = planned
            .destination
            .strip_prefix(base)
            .ok()
            .and_then(|rel| rel.components().next())
            .map(|c| c.as_os_str().to_string_lossy().into_owned());
        if let Some(folder) = folder {
            audit.record_learning(&ext.to_ascii_lowercase(), &folder, approved)?;
        }
    }
    Ok(())
}
