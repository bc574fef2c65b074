//! SQLite-backed job and execution stores.

use anyhow::Result;
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use super::{schema, ExecutionStore, JobStore};
use crate::engine::cron;
use crate::model::{Execution, Job, NewExecution, NewJob};

/// Connection pool type.
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// One store over one pool, implementing both persistence interfaces.
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        command: row.get(3)?,
        cron_expression: row.get(4)?,
        enabled: row.get::<_, i64>(5)? != 0,
    })
}

fn execution_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Execution> {
    Ok(Execution {
        id: row.get(0)?,
        job_id: row.get(1)?,
        start_time: parse_timestamp(2, row.get(2)?)?,
        end_time: parse_timestamp(3, row.get(3)?)?,
        exit_code: row.get(4)?,
        success: row.get::<_, i64>(5)? != 0,
        output: row.get(6)?,
    })
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
        })
}

/// Blank cron expressions are stored as NULL; non-blank ones must parse.
fn checked_cron_expression(job: &NewJob) -> Result<Option<String>> {
    let expression = job
        .cron_expression
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    if let Some(expression) = expression {
        cron::validate(expression)?;
    }
    Ok(expression.map(str::to_string))
}

const JOB_COLUMNS: &str = "id, name, description, command, cron_expression, enabled";
const EXECUTION_COLUMNS: &str = "id, job_id, start_time, end_time, exit_code, success, output";

#[async_trait::async_trait]
impl JobStore for SqliteStore {
    async fn find_all(&self) -> Result<Vec<Job>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Job>> {
            let conn = pool.get()?;
            let mut stmt =
                conn.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY id"))?;
            let rows = stmt.query_map([], job_from_row)?;
            let mut jobs = Vec::new();
            for row in rows {
                jobs.push(row?);
            }
            Ok(jobs)
        })
        .await?
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Job>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Job>> {
            let conn = pool.get()?;
            let mut stmt =
                conn.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))?;
            let mut rows = stmt.query_map(params![id], job_from_row)?;
            rows.next().transpose().map_err(Into::into)
        })
        .await?
    }

    async fn insert(&self, job: NewJob) -> Result<Job> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Job> {
            let cron_expression = checked_cron_expression(&job)?;
            let conn = pool.get()?;
            conn.execute(
                "INSERT INTO jobs (name, description, command, cron_expression, enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    job.name,
                    job.description,
                    job.command,
                    cron_expression,
                    job.enabled as i64
                ],
            )?;
            Ok(Job {
                id: conn.last_insert_rowid(),
                name: job.name,
                description: job.description,
                command: job.command,
                cron_expression,
                enabled: job.enabled,
            })
        })
        .await?
    }

    async fn update(&self, id: i64, job: NewJob) -> Result<Option<Job>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Job>> {
            let cron_expression = checked_cron_expression(&job)?;
            let conn = pool.get()?;
            let changed = conn.execute(
                "UPDATE jobs
                 SET name = ?2, description = ?3, command = ?4, cron_expression = ?5,
                     enabled = ?6, updated_at = datetime('now')
                 WHERE id = ?1",
                params![
                    id,
                    job.name,
                    job.description,
                    job.command,
                    cron_expression,
                    job.enabled as i64
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            Ok(Some(Job {
                id,
                name: job.name,
                description: job.description,
                command: job.command,
                cron_expression,
                enabled: job.enabled,
            }))
        })
        .await?
    }

    async fn set_enabled(&self, id: i64, enabled: bool) -> Result<Option<Job>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Job>> {
            let conn = pool.get()?;
            let changed = conn.execute(
                "UPDATE jobs SET enabled = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![id, enabled as i64],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let mut stmt =
                conn.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))?;
            let mut rows = stmt.query_map(params![id], job_from_row)?;
            rows.next().transpose().map_err(Into::into)
        })
        .await?
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<bool> {
            let conn = pool.get()?;
            let changed = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
        .await?
    }
}

#[async_trait::async_trait]
impl ExecutionStore for SqliteStore {
    async fn append(&self, execution: NewExecution) -> Result<Execution> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Execution> {
            let conn = pool.get()?;
            conn.execute(
                "INSERT INTO executions (job_id, start_time, end_time, exit_code, success, output)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    execution.job_id,
                    execution.start_time.to_rfc3339(),
                    execution.end_time.to_rfc3339(),
                    execution.exit_code,
                    execution.success as i64,
                    execution.output
                ],
            )?;
            Ok(Execution {
                id: conn.last_insert_rowid(),
                job_id: execution.job_id,
                start_time: execution.start_time,
                end_time: execution.end_time,
                exit_code: execution.exit_code,
                success: execution.success,
                output: execution.output,
            })
        })
        .await?
    }

    async fn find_by_job(&self, job_id: i64) -> Result<Vec<Execution>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Execution>> {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {EXECUTION_COLUMNS} FROM executions WHERE job_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![job_id], execution_from_row)?;
            let mut executions = Vec::new();
            for row in rows {
                executions.push(row?);
            }
            Ok(executions)
        })
        .await?
    }

    async fn delete_by_job(&self, job_id: i64) -> Result<usize> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<usize> {
            let conn = pool.get()?;
            let changed =
                conn.execute("DELETE FROM executions WHERE job_id = ?1", params![job_id])?;
            Ok(changed)
        })
        .await?
    }
}
