//! Follow-up command execution (`--then`), e.g. `pod install` once the
//! Podfile has been patched.

use crate::cli::signals::{CancellationToken, with_cancellation};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

/// Errors running the follow-up command
#[derive(Debug, Error)]
pub enum FollowupError {
    #[error("follow-up command failed to spawn: {0}")]
    SpawnFailed(std::io::Error),

    #[error("follow-up command timed out after {0:?}")]
    Timeout(Duration),

    #[error("follow-up command interrupted")]
    Interrupted,

    #[error("failed to read {stream} of follow-up command (exit code {exit_code:?}): {source}")]
    Output {
        stream: OutputStream,
        source: std::io::Error,
        exit_code: Option<i32>,
    },

    #[error("failed waiting for follow-up command: {0}")]
    Wait(std::io::Error),
}

/// How a follow-up command finished
#[derive(Debug, Clone)]
pub struct FollowupResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl FollowupResult {
    /// Output with stream headers, for error reports
    pub fn combined_output(&self) -> String {
        let mut output = String::new();
        if !self.stdout.is_empty() {
            output.push_str("=== stdout ===\n");
            output.push_str(&self.stdout);
            if !self.stdout.ends_with('\n') {
                output.push('\n');
            }
        }
        if !self.stderr.is_empty() {
            output.push_str("=== stderr ===\n");
            output.push_str(&self.stderr);
        }
        output
    }
}

fn exit_status_code_parts(code: Option<i32>, _signal: Option<i32>) -> Option<i32> {
    if let Some(code) = code {
        return Some(code);
    }
    #[cfg(unix)]
    {
        if let Some(signal) = _signal {
            return Some(128 + signal);
        }
    }
    None
}

/// Exit code of a finished process; 128+signal for signal-terminated ones on Unix.
pub(crate) fn exit_status_code(status: &std::process::ExitStatus) -> Option<i32> {
    let code = status.code();
    #[cfg(unix)]
    let signal = status.signal();
    #[cfg(not(unix))]
    let signal = None;
    exit_status_code_parts(code, signal)
}

async fn capture_exit_code(child: &mut Child) -> Option<i32> {
    match child.try_wait() {
        Ok(Some(status)) => exit_status_code(&status),
        Ok(None) => child
            .wait()
            .await
            .ok()
            .and_then(|status| exit_status_code(&status)),
        Err(_) => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Wait for child output, reading stdout and stderr concurrently.
async fn wait_for_child_output(
    child: &mut Child,
) -> Result<(String, String, std::process::ExitStatus), FollowupError> {
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let stdout_fut = async move {
        let mut buf = String::new();
        if let Some(mut out) = stdout_pipe {
            out.read_to_string(&mut buf)
                .await
                .map_err(|e| (OutputStream::Stdout, e))?;
        }
        Ok::<_, (OutputStream, std::io::Error)>(buf)
    };

    let stderr_fut = async move {
        let mut buf = String::new();
        if let Some(mut err) = stderr_pipe {
            err.read_to_string(&mut buf)
                .await
                .map_err(|e| (OutputStream::Stderr, e))?;
        }
        Ok::<_, (OutputStream, std::io::Error)>(buf)
    };

    let (stdout, stderr) = match tokio::try_join!(stdout_fut, stderr_fut) {
        Ok(result) => result,
        Err((stream, source)) => {
            let _ = child.kill().await;
            let exit_code = capture_exit_code(child).await;
            return Err(FollowupError::Output {
                stream,
                source,
                exit_code,
            });
        }
    };

    let status = child.wait().await.map_err(FollowupError::Wait)?;
    Ok((stdout, stderr, status))
}

/// Run `command` through `sh -c` in `working_dir`.
///
/// The child is killed when the timeout expires or `cancel` fires.
pub async fn run_followup(
    command: &str,
    working_dir: &Path,
    timeout_duration: Option<Duration>,
    cancel: CancellationToken,
) -> Result<FollowupResult, FollowupError> {
    let start = Instant::now();
    tracing::info!(command, dir = %working_dir.display(), "running follow-up command");

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(FollowupError::SpawnFailed)?;

    let waited = with_cancellation(cancel, async {
        match timeout_duration {
            Some(dur) => match timeout(dur, wait_for_child_output(&mut child)).await {
                Ok(r) => r,
                Err(_) => Err(FollowupError::Timeout(dur)),
            },
            None => wait_for_child_output(&mut child).await,
        }
    })
    .await;

    let (stdout, stderr, status) = match waited {
        Some(Ok(output)) => output,
        Some(Err(e)) => {
            let _ = child.kill().await;
            return Err(e);
        }
        None => {
            let _ = child.kill().await;
            return Err(FollowupError::Interrupted);
        }
    };

    let duration = start.elapsed();
    let exit_code = exit_status_code(&status);
    tracing::debug!(command, ?exit_code, ?duration, "follow-up command finished");

    Ok(FollowupResult {
        success: status.success(),
        exit_code,
        stdout,
        stderr,
        duration,
    })
}
