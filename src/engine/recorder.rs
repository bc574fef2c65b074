//! Execution record construction.
//!
//! The single point where success is derived from the exit code and where
//! the stored output is selected, normalized, and capped.

use chrono::{DateTime, Utc};

use super::runner::RunOutcome;
use crate::model::NewExecution;

/// Hard cap on stored output, in characters.
pub const OUTPUT_CAP: usize = 10_000;

/// Exit code recorded when the engine itself failed to run the command
/// (spawn error, interrupted wait, signal death). Real process exit codes
/// occupy 0-255, so a negative value cannot collide with one.
pub const ENGINE_FAILURE_EXIT_CODE: i32 = -1;

/// Output stored for a job with no command configured.
pub const NO_COMMAND_NOTICE: &str = "No job script provided.";

/// A job without a command succeeds immediately; no process is spawned.
pub fn no_command(job_id: i64, start_time: DateTime<Utc>) -> NewExecution {
    NewExecution {
        job_id,
        start_time,
        end_time: Utc::now(),
        exit_code: 0,
        success: true,
        output: NO_COMMAND_NOTICE.to_string(),
    }
}

/// Record a completed process run.
///
/// A failed run stores stderr instead of stdout so the diagnostics are not
/// buried under whatever the command printed before dying.
pub fn from_process(job_id: i64, start_time: DateTime<Utc>, outcome: &RunOutcome) -> NewExecution {
    let success = outcome.exit_code == 0;
    let selected = if success {
        &outcome.stdout
    } else {
        &outcome.stderr
    };
    NewExecution {
        job_id,
        start_time,
        end_time: Utc::now(),
        exit_code: outcome.exit_code,
        success,
        output: clip(tidy(selected)),
    }
}

/// Record an engine-level failure (the process never ran or its exit could
/// not be observed), with the diagnostic text in place of captured output.
pub fn from_engine_failure(
    job_id: i64,
    start_time: DateTime<Utc>,
    diagnostic: &str,
) -> NewExecution {
    NewExecution {
        job_id,
        start_time,
        end_time: Utc::now(),
        exit_code: ENGINE_FAILURE_EXIT_CODE,
        success: false,
        output: clip(diagnostic),
    }
}

/// Strip the final line terminator a well-behaved command appends.
fn tidy(text: &str) -> &str {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.strip_suffix('\r').unwrap_or(text)
}

/// Clip to [`OUTPUT_CAP`] characters on a char boundary.
fn clip(text: &str) -> String {
    match text.char_indices().nth(OUTPUT_CAP) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
