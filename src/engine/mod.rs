//! Scheduling-and-execution engine.
//!
//! The engine owns the poll loop that decides which jobs are due, the
//! process runner that executes their commands, and the recorder that turns
//! outcomes into immutable execution records. It consumes the job and
//! execution stores as abstract interfaces and never writes back to a job.

pub mod cron;
pub mod dispatch;
pub mod recorder;
pub mod runner;

pub use dispatch::EngineHandle;
pub use recorder::{ENGINE_FAILURE_EXIT_CODE, NO_COMMAND_NOTICE, OUTPUT_CAP};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::model::Execution;
use crate::store::{ExecutionStore, JobStore};

/// Errors surfaced by engine operations.
///
/// Process-level failures are deliberately absent: a command that could not
/// be spawned or that exited non-zero is recorded as a failed execution,
/// not raised as an error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("no job found with id {0}")]
    JobNotFound(i64),

    #[error("failed to start process: {0}")]
    ProcessSpawnFailure(String),

    #[error("store operation failed: {0}")]
    Store(anyhow::Error),
}

/// The scheduling-and-execution engine.
///
/// Holds the stores and the poll tick period. Start the recurring loop with
/// [`dispatch::start`]; `execute_job_now` serves on-demand runs and every
/// dispatched poll task.
pub struct Engine {
    jobs: Arc<dyn JobStore>,
    executions: Arc<dyn ExecutionStore>,
    tick_seconds: u64,
}

impl Engine {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        executions: Arc<dyn ExecutionStore>,
        tick_seconds: u64,
    ) -> Self {
        Self {
            jobs,
            executions,
            tick_seconds,
        }
    }

    /// Poll tick period.
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }

    /// The due window: a job fires when its next occurrence falls within
    /// one tick of the current time.
    pub(crate) fn tick_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.tick_seconds as i64)
    }

    /// Execute one job immediately, regardless of its schedule.
    ///
    /// The job is re-resolved by id, so callers holding a stale snapshot
    /// cannot act on a deleted or edited definition. A blank or absent
    /// command short-circuits to an immediate success without spawning
    /// anything. Only a missing job or a store failure surfaces as an
    /// error; anything that went wrong with the process itself is data in
    /// the returned execution.
    pub async fn execute_job_now(&self, job_id: i64) -> Result<Execution, EngineError> {
        let job = self
            .jobs
            .find_by_id(job_id)
            .await
            .map_err(EngineError::Store)?
            .ok_or(EngineError::JobNotFound(job_id))?;

        let start_time = Utc::now();
        let command = job.command.as_deref().map(str::trim).filter(|c| !c.is_empty());

        let record = match command {
            None => recorder::no_command(job.id, start_time),
            Some(command) => match runner::run(command).await {
                Ok(outcome) => recorder::from_process(job.id, start_time, &outcome),
                Err(err) => recorder::from_engine_failure(job.id, start_time, &err.to_string()),
            },
        };

        self.executions.append(record).await.map_err(EngineError::Store)
    }
}
