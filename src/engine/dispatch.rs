//! Poll loop: scan the job store on a fixed tick and dispatch due jobs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::{cron, Engine, EngineError};

/// One tick: load all jobs, due-check the enabled ones, and dispatch each
/// due job fire-and-forget. Returns the dispatched job ids.
///
/// Faults are isolated per job: a malformed cron expression is logged and
/// skipped without touching the rest of the batch. Dispatched tasks carry
/// only the job id and re-resolve the job at execution time, so a job
/// deleted between scan and dispatch records nothing.
pub async fn poll_once(engine: &Arc<Engine>, now: DateTime<Utc>) -> Vec<i64> {
    let jobs = match engine.jobs.find_all().await {
        Ok(jobs) => jobs,
        Err(err) => {
            error!("failed to load jobs: {err:#}");
            return Vec::new();
        }
    };

    let window = engine.tick_window();
    let mut dispatched = Vec::new();

    for job in jobs {
        if !job.enabled {
            continue;
        }
        // An enabled job without a schedule only runs on demand.
        let Some(expression) = job.cron_expression.as_deref() else {
            continue;
        };

        let next = match cron::next_fire_time(expression, now) {
            Ok(Some(next)) => next,
            Ok(None) => continue,
            Err(err) => {
                warn!(job_id = job.id, name = %job.name, %err, "skipping job with unusable cron expression");
                continue;
            }
        };

        if next - now <= window {
            info!(job_id = job.id, name = %job.name, fire_at = %next, "job due");
            let engine = Arc::clone(engine);
            let job_id = job.id;
            tokio::spawn(async move {
                match engine.execute_job_now(job_id).await {
                    Ok(execution) => info!(
                        job_id,
                        execution_id = execution.id,
                        success = execution.success,
                        exit_code = execution.exit_code,
                        "job finished"
                    ),
                    Err(EngineError::JobNotFound(_)) => {
                        warn!(job_id, "job deleted before dispatch, skipping")
                    }
                    Err(err) => error!(job_id, "job execution failed: {err:#}"),
                }
            });
            dispatched.push(job_id);
        }
    }

    dispatched
}

/// Handle to the running poll loop. Dropping it also stops the loop;
/// outstanding dispatched executions are left to finish on the runtime.
pub struct EngineHandle {
    task: tokio::task::JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl EngineHandle {
    /// Stop ticking and wait for the loop task to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Start the recurring poll loop on the current runtime.
pub fn start(engine: Arc<Engine>) -> EngineHandle {
    let (shutdown, mut rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        info!(tick_seconds = engine.tick().as_secs(), "scheduler loop started");
        let mut interval = tokio::time::interval(engine.tick());
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    poll_once(&engine, Utc::now()).await;
                }
                _ = rx.changed() => {
                    info!("scheduler loop stopping");
                    break;
                }
            }
        }
    });
    EngineHandle { task, shutdown }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Execution, Job, NewExecution, NewJob};
    use crate::store::{ExecutionStore, JobStore};
    use anyhow::Result;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory store used to exercise the loop without SQLite.
    #[derive(Default)]
    struct MemStore {
        jobs: Mutex<Vec<Job>>,
        executions: Mutex<Vec<Execution>>,
        next_id: AtomicI64,
    }

    impl MemStore {
        fn with_jobs(jobs: Vec<Job>) -> Arc<Self> {
            let store = Self::default();
            let max = jobs.iter().map(|j| j.id).max().unwrap_or(0);
            store.next_id.store(max + 1, Ordering::SeqCst);
            *store.jobs.lock().unwrap() = jobs;
            Arc::new(store)
        }

        fn recorded_job_ids(&self) -> Vec<i64> {
            self.executions.lock().unwrap().iter().map(|e| e.job_id).collect()
        }
    }

    #[async_trait::async_trait]
    impl JobStore for MemStore {
        async fn find_all(&self) -> Result<Vec<Job>> {
            Ok(self.jobs.lock().unwrap().clone())
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<Job>> {
            Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned())
        }

        async fn insert(&self, job: NewJob) -> Result<Job> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let job = Job {
                id,
                name: job.name,
                description: job.description,
                command: job.command,
                cron_expression: job.cron_expression,
                enabled: job.enabled,
            };
            self.jobs.lock().unwrap().push(job.clone());
            Ok(job)
        }

        async fn update(&self, id: i64, update: NewJob) -> Result<Option<Job>> {
            let mut jobs = self.jobs.lock().unwrap();
            let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
                return Ok(None);
            };
            job.name = update.name;
            job.description = update.description;
            job.command = update.command;
            job.cron_expression = update.cron_expression;
            job.enabled = update.enabled;
            Ok(Some(job.clone()))
        }

        async fn set_enabled(&self, id: i64, enabled: bool) -> Result<Option<Job>> {
            let mut jobs = self.jobs.lock().unwrap();
            let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
                return Ok(None);
            };
            job.enabled = enabled;
            Ok(Some(job.clone()))
        }

        async fn delete(&self, id: i64) -> Result<bool> {
            let mut jobs = self.jobs.lock().unwrap();
            let before = jobs.len();
            jobs.retain(|j| j.id != id);
            Ok(jobs.len() != before)
        }
    }

    #[async_trait::async_trait]
    impl ExecutionStore for MemStore {
        async fn append(&self, execution: NewExecution) -> Result<Execution> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let execution = Execution {
                id,
                job_id: execution.job_id,
                start_time: execution.start_time,
                end_time: execution.end_time,
                exit_code: execution.exit_code,
                success: execution.success,
                output: execution.output,
            };
            self.executions.lock().unwrap().push(execution.clone());
            Ok(execution)
        }

        async fn find_by_job(&self, job_id: i64) -> Result<Vec<Execution>> {
            Ok(self
                .executions
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.job_id == job_id)
                .cloned()
                .collect())
        }

        async fn delete_by_job(&self, job_id: i64) -> Result<usize> {
            let mut executions = self.executions.lock().unwrap();
            let before = executions.len();
            executions.retain(|e| e.job_id != job_id);
            Ok(before - executions.len())
        }
    }

    fn job(id: i64, command: &str, cron: &str, enabled: bool) -> Job {
        Job {
            id,
            name: format!("job-{id}"),
            description: String::new(),
            command: Some(command.to_string()),
            cron_expression: Some(cron.to_string()),
            enabled,
        }
    }

    fn engine_over(store: &Arc<MemStore>) -> Arc<Engine> {
        Arc::new(Engine::new(store.clone(), store.clone(), 5))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("condition not met within 5s");
    }

    #[tokio::test]
    async fn test_due_job_is_dispatched_and_recorded() {
        let store = MemStore::with_jobs(vec![job(1, "echo hi", "* * * * * *", true)]);
        let engine = engine_over(&store);

        let dispatched = poll_once(&engine, Utc::now()).await;
        assert_eq!(dispatched, vec![1]);

        let store2 = store.clone();
        wait_until(move || store2.recorded_job_ids() == vec![1]).await;
    }

    #[tokio::test]
    async fn test_disabled_job_is_never_dispatched() {
        let store = MemStore::with_jobs(vec![job(1, "echo hi", "* * * * * *", false)]);
        let engine = engine_over(&store);

        assert!(poll_once(&engine, Utc::now()).await.is_empty());
    }

    #[tokio::test]
    async fn test_job_outside_window_is_not_dispatched() {
        // Fires at second 0 of minute 30 of hour 3; nowhere near any
        // 5-second window around "now" unless we are very unlucky, so pin
        // the reference time instead of using the clock.
        use chrono::TimeZone;
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let store = MemStore::with_jobs(vec![job(1, "echo hi", "0 30 3 * * *", true)]);
        let engine = engine_over(&store);

        assert!(poll_once(&engine, now).await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_expression_does_not_poison_the_tick() {
        let store = MemStore::with_jobs(vec![
            job(1, "echo a", "not a cron expression at all", true),
            job(2, "echo b", "* * * * * *", true),
            job(3, "echo c", "* * * * *", true),
        ]);
        let engine = engine_over(&store);

        let dispatched = poll_once(&engine, Utc::now()).await;
        assert_eq!(dispatched, vec![2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_job_does_not_delay_other_dispatches() {
        let store = MemStore::with_jobs(vec![
            job(1, "sleep 30", "* * * * * *", true),
            job(2, "echo fast", "* * * * * *", true),
        ]);
        let engine = engine_over(&store);

        let started = std::time::Instant::now();
        let dispatched = poll_once(&engine, Utc::now()).await;
        assert_eq!(dispatched, vec![1, 2]);
        // The scan itself must return without waiting on either command.
        assert!(started.elapsed() < Duration::from_secs(2));

        // The fast job completes while the slow one is still running.
        let store2 = store.clone();
        wait_until(move || store2.recorded_job_ids().contains(&2)).await;
        assert!(!store.recorded_job_ids().contains(&1));
    }

    #[tokio::test]
    async fn test_job_deleted_between_scan_and_dispatch_records_nothing() {
        let store = MemStore::with_jobs(vec![job(1, "echo hi", "* * * * * *", true)]);
        let engine = Arc::new(Engine::new(store.clone(), store.clone(), 5));

        // Simulate the race by deleting before the dispatched task runs.
        store.jobs.lock().unwrap().clear();
        let dispatched = poll_once(&engine, Utc::now()).await;
        assert!(dispatched.is_empty());

        let execution = engine.execute_job_now(1).await;
        assert!(matches!(execution, Err(EngineError::JobNotFound(1))));
        assert!(store.recorded_job_ids().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_stops_the_loop() {
        let store = MemStore::with_jobs(vec![]);
        let engine = engine_over(&store);

        let handle = start(engine);
        handle.shutdown().await;
    }
}
