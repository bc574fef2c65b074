use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use jobwarden::config::Config;
use jobwarden::engine::{cron, Engine};
use jobwarden::store::sqlite::{open_pool, SqliteStore};
use jobwarden::store::{ExecutionStore, JobStore};

#[derive(Parser)]
#[command(
    name = "jobwarden",
    about = "Lightweight cron job scheduler with execution history",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + scheduler loop)
    Serve {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// SQLite database path
        #[arg(long)]
        db: Option<String>,

        /// Poll tick period in seconds
        #[arg(long)]
        tick: Option<u64>,
    },

    /// Manage jobs and their execution history
    Job {
        /// SQLite database path
        #[arg(long, default_value = "data/jobwarden.db")]
        db: String,

        #[command(subcommand)]
        action: JobAction,
    },
}

#[derive(Subcommand)]
enum JobAction {
    /// List all jobs
    List,

    /// Show one job
    Show { id: i64 },

    /// Add a new job
    Add {
        /// Job name
        #[arg(long)]
        name: String,

        /// Free-form description
        #[arg(long, default_value = "")]
        description: String,

        /// Command line to execute (omit for a no-op job)
        #[arg(long)]
        command: Option<String>,

        /// Six-field cron expression (second minute hour day-of-month month day-of-week)
        #[arg(long)]
        cron: Option<String>,

        /// Create the job disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Remove a job (execution history is kept)
    Remove { id: i64 },

    /// Enable a job
    Enable { id: i64 },

    /// Disable a job
    Disable { id: i64 },

    /// Execute a job immediately, regardless of its schedule
    Run { id: i64 },

    /// Print a job's execution history
    History { id: i64 },

    /// Preview upcoming fire times for enabled jobs
    Next {
        /// Hours to look ahead
        #[arg(long, default_value = "24")]
        hours: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            db,
            tick,
        } => {
            let mut config = match config {
                Some(path) => Config::load(&path)?,
                None => Config::default(),
            };
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(db) = db {
                config.db_path = db;
            }
            if let Some(tick) = tick {
                config.tick_seconds = tick;
            }
            tracing::info!(bind = %config.bind, "Starting jobwarden daemon");
            jobwarden::serve(config).await?;
        }
        Commands::Job { db, action } => {
            let pool = open_pool(&db)?;
            let store = Arc::new(SqliteStore::new(pool));
            run_job_action(store, action).await?;
        }
    }

    Ok(())
}

async fn run_job_action(store: Arc<SqliteStore>, action: JobAction) -> Result<()> {
    match action {
        JobAction::List => {
            let jobs = store.find_all().await?;
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!(
                    "{:<6} | {:<20} | {:<20} | {:<8} | Command",
                    "Id", "Name", "Cron", "Enabled"
                );
                println!("{:-<6}-|-{:-<20}-|-{:-<20}-|-{:-<8}-|-{:-<30}", "", "", "", "", "");
                for job in jobs {
                    println!(
                        "{:<6} | {:<20} | {:<20} | {:<8} | {}",
                        job.id,
                        job.name,
                        job.cron_expression.as_deref().unwrap_or("-"),
                        job.enabled,
                        job.command.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        JobAction::Show { id } => {
            let job = store
                .find_by_id(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no job found with id {id}"))?;
            println!("Job #{}", job.id);
            println!("  name:        {}", job.name);
            println!("  description: {}", job.description);
            println!("  command:     {}", job.command.as_deref().unwrap_or("-"));
            println!(
                "  cron:        {}",
                job.cron_expression.as_deref().unwrap_or("-")
            );
            println!("  enabled:     {}", job.enabled);
        }
        JobAction::Add {
            name,
            description,
            command,
            cron,
            disabled,
        } => {
            let job = store
                .insert(jobwarden::model::NewJob {
                    name,
                    description,
                    command,
                    cron_expression: cron,
                    enabled: !disabled,
                })
                .await?;
            println!("Job '{}' added with id {}.", job.name, job.id);
        }
        JobAction::Remove { id } => {
            if !store.delete(id).await? {
                anyhow::bail!("no job found with id {id}");
            }
            println!("Job {id} removed.");
        }
        JobAction::Enable { id } => {
            store
                .set_enabled(id, true)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no job found with id {id}"))?;
            println!("Job {id} enabled.");
        }
        JobAction::Disable { id } => {
            store
                .set_enabled(id, false)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no job found with id {id}"))?;
            println!("Job {id} disabled.");
        }
        JobAction::Run { id } => {
            let jobs: Arc<dyn JobStore> = store.clone();
            let executions: Arc<dyn ExecutionStore> = store;
            let engine = Engine::new(jobs, executions, Config::default().tick_seconds);
            let execution = engine.execute_job_now(id).await?;
            println!("Execution #{} of job {}", execution.id, execution.job_id);
            println!("  success:   {}", execution.success);
            println!("  exit code: {}", execution.exit_code);
            println!("  started:   {}", execution.start_time.to_rfc3339());
            println!("  finished:  {}", execution.end_time.to_rfc3339());
            println!("  output:");
            for line in execution.output.lines() {
                println!("    {line}");
            }
        }
        JobAction::History { id } => {
            let history = store.find_by_job(id).await?;
            if history.is_empty() {
                println!("No executions found for job {id}.");
            } else {
                println!(
                    "{:<6} | {:<25} | {:<9} | {:<7} | Output",
                    "Id", "Started", "Exit code", "Success"
                );
                println!("{:-<6}-|-{:-<25}-|-{:-<9}-|-{:-<7}-|-{:-<30}", "", "", "", "", "");
                for execution in history {
                    let first_line = execution.output.lines().next().unwrap_or("");
                    println!(
                        "{:<6} | {:<25} | {:<9} | {:<7} | {}",
                        execution.id,
                        execution.start_time.to_rfc3339(),
                        execution.exit_code,
                        execution.success,
                        first_line
                    );
                }
            }
        }
        JobAction::Next { hours } => {
            let now = chrono::Utc::now();
            let until = now + chrono::Duration::hours(hours as i64);
            let mut upcoming = Vec::new();
            for job in store.find_all().await? {
                if !job.enabled {
                    continue;
                }
                let Some(expression) = job.cron_expression.as_deref() else {
                    continue;
                };
                match cron::fire_times_within(expression, now, until) {
                    Ok(times) => {
                        for time in times {
                            upcoming.push((time, job.name.clone()));
                        }
                    }
                    Err(err) => {
                        tracing::warn!(job_id = job.id, %err, "skipping job in preview");
                    }
                }
            }
            upcoming.sort_by(|a, b| a.0.cmp(&b.0));

            if upcoming.is_empty() {
                println!("No runs scheduled in next {hours} hours.");
            } else {
                println!("Upcoming runs (next {hours} hours):");
                for (time, name) in upcoming {
                    println!("{} : {}", time.to_rfc3339(), name);
                }
            }
        }
    }
    Ok(())
}
