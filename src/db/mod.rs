// src/db/mod.rs

//! SQLite audit store plumbing
//!
//! The relational store is the source of truth for the plan lifecycle. All
//! writes go through a single connection owned by the audit store;
//! `synchronous = FULL` keeps commits durable before the JSONL mirror is
//! appended.

pub mod models;
pub mod paths;
pub mod schema;

use crate::{Error, Result};
use rusqlite::Connection;
use std::fs;
use std::path::Path;

/// Initialize a database at `db_path`, creating parent directories
pub fn init(db_path: &Path) -> Result<()> {
    open(db_path)?;
    Ok(())
}

/// Open a database connection with durability pragmas and an up-to-date schema
pub fn open(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::fs("create database directory", parent.to_path_buf(), e))?;
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA synchronous = FULL;",
    )?;

    schema::migrate(&conn)?;
    Ok(conn)
}

/// Run `f` inside a transaction, committing on success
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
{
    let tx = conn.transaction()?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}
