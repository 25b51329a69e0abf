// src/commands/audit.rs

//! Audit command: render the transition stream
//!
//! Transitions come from `audit.jsonl` with checksum verification; a
//! corrupt record stops the replay and is reported. Per-file history
//! (`--file`) queries the relational moves table, which is the authority.

use crate::audit::{AuditStore, Transition};
use crate::commands::AppContext;
use crate::db::models::MoveRow;
use crate::Result;

pub fn cmd_audit(last: Option<usize>, date: Option<String>, file: Option<String>) -> Result<i32> {
    let ctx = AppContext::load()?;
    let store = AuditStore::open(&ctx.organizer_dir, ctx.redactor.clone())?;

    if let Some(name) = file {
        let moves = MoveRow::search(store.connection(), &name, last.unwrap_or(100) as i64)?;
        if moves.is_empty() {
            println!("No recorded moves mention '{name}'.");
            return Ok(0);
        }
        for entry in &moves {
            println!(
                "[{}] MOVE (proposal {}) {} -> {}",
                entry.timestamp.as_deref().unwrap_or("?"),
                entry.proposal_id,
                entry.original_path,
                entry.new_path
            );
        }
        return Ok(0);
    }

    let replay = store.replay()?;
    let mut transitions: Vec<&Transition> = replay
        .transitions
        .iter()
        .filter(|t| matches_date(t, date.as_deref()))
        .collect();

    if let Some(last) = last {
        if transitions.len() > last {
            transitions.drain(..transitions.len() - last);
        }
    }

    if transitions.is_empty() {
        println!("No matching audit records.");
    }

    for transition in &transitions {
        let timestamp = transition.value["timestamp"].as_str().unwrap_or("?");
        let action = transition.value["action"].as_str().unwrap_or("?");
        let mut details: Vec<String> = Vec::new();
        if let Some(object) = transition.value.as_object() {
            for (key, value) in object {
                if key == "timestamp" || key == "action" {
                    continue;
                }
                details.push(format!("{key}={value}"));
            }
        }
        println!("[{timestamp}] {} {}", action.to_uppercase(), details.join(" "));
    }

    if let Some(line) = replay.corrupt_at {
        eprintln!(
            "Warning: audit stream failed checksum verification at line {line}; \
             records from there on are not shown. The relational store \
             (audit.db) remains authoritative."
        );
        return Ok(1);
    }

    Ok(0)
}

fn matches_date(transition: &Transition, date: Option<&str>) -> bool {
    match date {
        Some(date) => transition.value["timestamp"]
            .as_str()
            .is_some_and(|ts| ts.starts_with(date)),
        None => true,
    }
}
