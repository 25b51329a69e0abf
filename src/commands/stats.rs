// src/commands/stats.rs

//! Stats command: aggregate counts from the audit store

use crate::audit::AuditStore;
use crate::commands::AppContext;
use crate::db::models::{MoveRow, ProposalRow, ScanRow};
use crate::Result;
use rusqlite::Connection;

pub fn cmd_stats(summary: bool) -> Result<i32> {
    let ctx = AppContext::load()?;
    let store = AuditStore::open(&ctx.organizer_dir, ctx.redactor.clone())?;
    let conn = store.connection();

    let scans = ScanRow::count(conn)?;
    let moves = MoveRow::count(conn)?;
    let (proposals, approved, rolled_back) = proposal_counts(conn)?;

    if summary {
        println!(
            "{scans} scan(s), {proposals} proposal(s) ({approved} approved, \
             {rolled_back} rolled back), {moves} file move(s)"
        );
        return Ok(0);
    }

    println!("Audit store statistics");
    println!("  Scans:       {scans}");
    println!("  Proposals:   {proposals}");
    println!("    approved:    {approved}");
    println!("    rolled back: {rolled_back}");
    println!("  Moves:       {moves}");

    let learned = learned_folder_counts(conn)?;
    if !learned.is_empty() {
        println!("  Learned patterns:");
        for (file_type, folder, count) in learned {
            println!("    .{file_type} -> {folder} ({count} decision(s))");
        }
    }

    let history = ProposalRow::history(conn, 5)?;
    if !history.is_empty() {
        println!("  Recent executions:");
        for (row, file_count) in history {
            println!(
                "    [{}] {} - {} file(s){}",
                row.id.unwrap_or_default(),
                row.timestamp.unwrap_or_default(),
                file_count,
                if row.rolled_back { " (rolled back)" } else { "" }
            );
        }
    }

    Ok(0)
}

fn proposal_counts(conn: &Connection) -> Result<(i64, i64, i64)> {
    let row = conn.query_row(
        "SELECT COUNT(*),
                SUM(CASE WHEN approved = 1 THEN 1 ELSE 0 END),
                SUM(CASE WHEN rolled_back = 1 THEN 1 ELSE 0 END)
         FROM proposals",
        [],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                row.get::<_, Option<i64>>(2)?.unwrap_or(0),
            ))
        },
    )?;
    Ok(row)
}

fn learned_folder_counts(conn: &Connection) -> Result<Vec<(String, String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT file_type, target_folder, COUNT(*) AS count
         FROM learning
         GROUP BY file_type, target_folder
         ORDER BY count DESC
         LIMIT 10",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
