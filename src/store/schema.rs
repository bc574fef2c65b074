//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            command TEXT,
            cron_expression TEXT,
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- No foreign key on job_id: history outlives job deletion.
        CREATE TABLE IF NOT EXISTS executions (
            id INTEGER PRIMARY KEY,
            job_id INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            exit_code INTEGER NOT NULL,
            success INTEGER NOT NULL,
            output TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_executions_job ON executions(job_id);",
    )?;

    Ok(())
}
