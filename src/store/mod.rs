//! Store layer -- the persistence interfaces the engine and API consume,
//! and their SQLite implementation.
//!
//! The engine only ever reads jobs (`find_all`, `find_by_id`) and appends
//! executions; the rest of the surface exists for the API and CLI.

pub mod schema;
pub mod sqlite;

use anyhow::Result;

use crate::model::{Execution, Job, NewExecution, NewJob};

/// Read/write access to job definitions.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Job>>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Job>>;
    async fn insert(&self, job: NewJob) -> Result<Job>;
    /// Full update; `None` when no job has this id.
    async fn update(&self, id: i64, job: NewJob) -> Result<Option<Job>>;
    async fn set_enabled(&self, id: i64, enabled: bool) -> Result<Option<Job>>;
    /// `true` when a row was deleted. Execution history is left in place.
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// Append-only access to execution history.
#[async_trait::async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Persist a record and assign its id. This is the durability point;
    /// records are never updated afterwards.
    async fn append(&self, execution: NewExecution) -> Result<Execution>;
    async fn find_by_job(&self, job_id: i64) -> Result<Vec<Execution>>;
    /// Purge one job's history; returns the number of rows removed.
    async fn delete_by_job(&self, job_id: i64) -> Result<usize>;
}
