//! SQLite connection setup.
//!
//! Every connection gets foreign keys switched on and a busy timeout, so
//! concurrent writers queue on the database lock instead of failing with
//! `SQLITE_BUSY`. Migrations are embedded in the binary and applied when a
//! connection is established.

use anyhow::{anyhow, Context, Result};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const BUSY_TIMEOUT_MS: u32 = 5000;

pub fn establish_connection(database_url: &str) -> Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(database_url)
        .with_context(|| format!("Error connecting to {}", database_url))?;
    configure(&mut conn).context("Error configuring SQLite connection")?;
    run_migrations(&mut conn)?;
    Ok(conn)
}

/// Applies per-connection pragmas. Pooled connections call this at the start
/// of every unit of work since the pool hands out connections it opened itself.
pub fn configure(conn: &mut SqliteConnection) -> QueryResult<()> {
    conn.batch_execute(&format!(
        "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
        BUSY_TIMEOUT_MS
    ))
}

pub fn run_migrations(conn: &mut SqliteConnection) -> Result<()> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("Error running migrations: {}", e))?;
    if !applied.is_empty() {
        tracing::info!(count = applied.len(), "applied database migrations");
    }
    Ok(())
}
