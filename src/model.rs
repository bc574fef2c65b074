//! Domain types shared by the engine, the store layer, and the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user-defined, recurring unit of work.
///
/// The engine only ever reads jobs; all edits happen through the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Command line to execute. `None` or blank means a no-op job that
    /// always succeeds immediately.
    pub command: Option<String>,
    /// Six-field cron expression (second minute hour day-of-month month
    /// day-of-week). Required for the poll loop to consider the job;
    /// a job without one can still be run on demand.
    pub cron_expression: Option<String>,
    pub enabled: bool,
}

/// Payload for creating a job, and for full updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

/// An immutable record of one attempt to run a job's command.
///
/// Executions reference their job by id only; deleting the job leaves its
/// history intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: i64,
    pub job_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Exit code of the process. `0` is success; engine-internal failures
    /// use a negative sentinel that no real process can produce.
    pub exit_code: i32,
    pub success: bool,
    /// Captured output, capped at 10,000 characters: stdout on success,
    /// stderr (or an engine diagnostic) on failure.
    pub output: String,
}

/// Pre-insert shape of an execution; the store assigns the id on append.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub job_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub exit_code: i32,
    pub success: bool,
    pub output: String,
}
