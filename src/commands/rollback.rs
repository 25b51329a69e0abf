// src/commands/rollback.rs

//! Rollback command

use crate::audit::AuditStore;
use crate::commands::AppContext;
use crate::db::paths;
use crate::recovery::ProcessLock;
use crate::rollback::{RollbackManager, RollbackOutcome};
use crate::Result;

pub fn cmd_rollback(last: bool, proposal: Option<i64>, show_history: bool) -> Result<i32> {
    let ctx = AppContext::load()?;

    if show_history {
        let mut audit = AuditStore::open(&ctx.organizer_dir, ctx.redactor.clone())?;
        let manager = RollbackManager::new(&mut audit, ctx.organizer_dir.clone());
        let history = manager.history(100)?;

        if history.is_empty() {
            println!("No executed proposals.");
            return Ok(0);
        }

        println!("Executed proposals:");
        for entry in &history {
            let state = if entry.rolled_back {
                "rolled back"
            } else {
                "reversible"
            };
            println!(
                "  [{}] {} - {} file(s) ({state})",
                entry.proposal_id, entry.timestamp, entry.file_count
            );
        }
        println!("\nTotal: {} proposal(s)", history.len());
        return Ok(0);
    }

    if !last && proposal.is_none() {
        eprintln!("Specify --last, --proposal ID, or --show-history.");
        return Ok(2);
    }

    // Rollback mutates tracked files: take the process lock
    let _lock = ProcessLock::acquire(&paths::lock_file(&ctx.organizer_dir))?;
    let mut audit = AuditStore::open(&ctx.organizer_dir, ctx.redactor.clone())?;
    let mut manager = RollbackManager::new(&mut audit, ctx.organizer_dir.clone());

    let (proposal_id, outcome) = match proposal {
        Some(id) => (id, manager.rollback(id)?),
        None => match manager.rollback_last()? {
            Some(result) => result,
            None => {
                println!("No operations to roll back.");
                return Ok(0);
            }
        },
    };

    report(proposal_id, &outcome);
    Ok(if outcome.unresolvable.is_empty() { 0 } else { 1 })
}

fn report(proposal_id: i64, outcome: &RollbackOutcome) {
    if outcome.already_rolled_back {
        println!("Proposal {proposal_id} was already rolled back; nothing to do.");
        return;
    }

    println!(
        "Rolled back proposal {proposal_id}: {} file(s) restored.",
        outcome.files_restored
    );
    for path in &outcome.unresolvable {
        eprintln!("  Unresolvable: {} (destination and backup missing)", path.display());
    }
}
