//! Shared subprocess utilities for the export and conversion stages.
//!
//! Both stages spawn a Python script with piped stdio, stream JSON progress
//! lines from stdout into the tracker, drain stderr at debug level, and map
//! a non-zero exit into a typed error — preferring the error message the
//! script itself reported over the raw exit status.

use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::error::{ConvertError, Result};
use crate::progress::ProgressTracker;
use crate::types::ScriptProgressLine;

/// How often the output loop re-checks the cancellation token while the
/// child is silent.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Spawn a Python script with piped stdio.
pub fn spawn_python<I, S>(python: &str, script: &Path, args: I) -> std::io::Result<Child>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(python)
        .arg(script)
        .args(args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}

/// Stream the child's output until stdout reaches EOF or cancellation fires.
///
/// JSON progress lines on stdout feed the tracker; non-JSON lines are logged
/// at debug level. stderr is drained concurrently in a spawned task — TF and
/// torch emit large amounts of stderr chatter, and letting that pipe fill
/// while stdout is being read would stall the child. The child can also stay
/// silent for many minutes during an export, so cancellation is polled on an
/// interval rather than only between lines; when it fires the child is
/// killed.
pub async fn stream_output(
    child: &mut Child,
    process_name: &str,
    progress: &ProgressTracker,
    cancel_token: &CancellationToken,
) -> Result<()> {
    let stderr_task = child.stderr.take().map(|stderr| {
        let name = process_name.to_string();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                debug!("[{}] stderr: {}", name, line);
            }
        })
    });

    let stdout = child.stdout.take().expect("stdout was piped");
    let mut reader = BufReader::new(stdout).lines();
    let mut cancel_poll = tokio::time::interval(CANCEL_POLL_INTERVAL);

    loop {
        tokio::select! {
            // next_line is cancel-safe, so no output is lost when the
            // interval branch wins the race.
            line = reader.next_line() => match line {
                Ok(Some(line)) => {
                    if let Ok(script_progress) = serde_json::from_str::<ScriptProgressLine>(&line) {
                        progress.update_from_script(&script_progress);
                    } else {
                        debug!("Non-JSON subprocess output: {}", line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Error reading subprocess stdout: {}", e);
                    break;
                }
            },
            _ = cancel_poll.tick() => {
                if cancel_token.is_cancelled() {
                    child.kill().await.ok();
                    if let Some(task) = stderr_task {
                        task.abort();
                    }
                    return Err(ConvertError::Cancelled);
                }
            }
        }
    }

    if let Some(task) = stderr_task {
        task.await.ok();
    }
    Ok(())
}

/// Wait for the child to exit; map a non-zero status to `map_err(message)`.
///
/// When the script reported an `error` progress line, that message is used
/// instead of the exit status.
pub async fn wait_and_check_exit<F>(
    child: &mut Child,
    process_name: &str,
    progress: &ProgressTracker,
    map_err: F,
) -> Result<()>
where
    F: FnOnce(String) -> ConvertError,
{
    let status = child.wait().await.map_err(|e| {
        ConvertError::io(
            "waiting for subprocess",
            std::path::PathBuf::from(process_name),
            e,
        )
    })?;

    if !status.success() {
        let message = progress.script_error().unwrap_or_else(|| {
            format!(
                "{process_name} exited with status {}",
                status.code().unwrap_or(-1)
            )
        });
        return Err(map_err(message));
    }
    Ok(())
}
