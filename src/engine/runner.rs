//! Process execution with safe output capture.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::recorder::ENGINE_FAILURE_EXIT_CODE;
use super::EngineError;

/// Raw result of one process run. Streams are captured in full; the
/// recorder applies the output cap.
#[derive(Debug)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` as a child process and capture both output streams.
///
/// The command line is split on whitespace: the first token is resolved
/// through the platform's executable lookup, the rest are passed as
/// arguments verbatim. No shell is involved, so quoting and expansion are
/// not available, and a missing executable fails here with
/// [`EngineError::ProcessSpawnFailure`] instead of a shell's exit 127.
///
/// Both pipes are drained on their own tasks while this task waits for the
/// child to exit. All three must make progress independently: pipe buffers
/// are bounded, and a child blocked writing to an unread stderr would never
/// reach EOF on stdout, deadlocking a sequential reader against the wait.
pub async fn run(command: &str) -> Result<RunOutcome, EngineError> {
    let mut tokens = command.split_whitespace();
    let program = tokens
        .next()
        .ok_or_else(|| EngineError::ProcessSpawnFailure("empty command".to_string()))?;

    let mut child = Command::new(program)
        .args(tokens)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            EngineError::ProcessSpawnFailure(format!("failed to spawn '{program}': {err}"))
        })?;

    let stdout_task = tokio::spawn(drain(child.stdout.take()));
    let stderr_task = tokio::spawn(drain(child.stderr.take()));

    let status = child.wait().await.map_err(|err| {
        EngineError::ProcessSpawnFailure(format!("failed waiting for '{program}': {err}"))
    })?;

    let stdout = stdout_task.await.map_err(|err| {
        EngineError::ProcessSpawnFailure(format!("stdout capture task failed: {err}"))
    })?;
    let stderr = stderr_task.await.map_err(|err| {
        EngineError::ProcessSpawnFailure(format!("stderr capture task failed: {err}"))
    })?;

    Ok(RunOutcome {
        // A signal-terminated process has no exit code; report the engine
        // sentinel, which is disjoint from the 0-255 process code space.
        exit_code: status.code().unwrap_or(ENGINE_FAILURE_EXIT_CODE),
        stdout,
        stderr,
    })
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(err) = pipe.read_to_end(&mut buf).await {
        tracing::warn!("output stream read failed: {err}");
    }
    String::from_utf8_lossy(&buf).into_owned()
}
