//! One interpreter attempt: feed stdin, drain stdout/stderr, await exit.
//!
//! Output is drained in background tasks while the process runs and only
//! finalized after the exit status is known, so a child that writes more
//! than a pipe buffer's worth cannot deadlock against us.

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;

use super::launcher::LaunchedProcess;
use super::types::SubprocessResult;

/// Maximum stdout or stderr size captured per stream (10 MiB).
///
/// Output exceeding this limit is truncated.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// How long to wait for stderr after killing a timed-out child.
pub const DRAIN_AFTER_KILL: Duration = Duration::from_secs(1);

/// Why an attempt produced no [`SubprocessResult`].
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("process exceeded {timeout_ms}ms and was killed after {elapsed_ms}ms")]
    TimedOut {
        timeout_ms: u64,
        elapsed_ms: u64,
        stderr: String,
    },

    #[error("failed waiting for process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Write `payload` to the child's stdin, close it, and collect the outcome.
///
/// The whole exchange (including the stdin write) runs under `timeout`;
/// when it elapses the child is killed.
pub async fn run_attempt(
    process: LaunchedProcess,
    payload: &[u8],
    timeout: Duration,
) -> Result<SubprocessResult, AttemptError> {
    let LaunchedProcess {
        stdin,
        stdout,
        stderr,
        mut exit,
    } = process;

    let start = Instant::now();

    let stdout_task = tokio::spawn(read_stream(stdout));
    let stderr_task = tokio::spawn(read_stream(stderr));

    let exchange = async {
        if let Some(mut stdin) = stdin {
            // The child may exit without reading its input; a broken pipe is
            // reported through the exit status instead.
            if let Err(e) = stdin.write_all(payload).await {
                tracing::debug!(error = %e, "Child closed stdin before payload was written");
            }
            let _ = stdin.shutdown().await;
        }
        exit.wait().await
    };

    let outcome = tokio::time::timeout(timeout, exchange).await;
    match outcome {
        Ok(Ok(exit_code)) => {
            let stdout = join_stream(stdout_task).await;
            let stderr = join_stream(stderr_task).await;
            Ok(SubprocessResult {
                exit_code,
                stdout,
                stderr,
            })
        }
        Ok(Err(e)) => {
            stdout_task.abort();
            stderr_task.abort();
            Err(AttemptError::Wait(e))
        }
        Err(_elapsed) => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            if let Err(e) = exit.kill().await {
                tracing::warn!(error = %e, "Failed to kill timed-out process");
            }
            stdout_task.abort();
            let stderr = tokio::time::timeout(DRAIN_AFTER_KILL, join_stream(stderr_task))
                .await
                .unwrap_or_default();
            Err(AttemptError::TimedOut {
                timeout_ms: timeout.as_millis() as u64,
                elapsed_ms,
                stderr,
            })
        }
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
///
/// Bytes past the cap are read and discarded so the child never blocks on,
/// or dies writing to, a closed pipe.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
        if buf.len() >= MAX_OUTPUT_BYTES {
            match tokio::io::copy(&mut h, &mut tokio::io::sink()).await {
                Ok(0) => {}
                Ok(discarded) => {
                    tracing::warn!(
                        kept = buf.len(),
                        discarded,
                        "Process output exceeded cap, truncated"
                    );
                }
                Err(e) => tracing::debug!(error = %e, "Stopped draining oversized output"),
            }
        }
    }
    buf
}

async fn join_stream(task: JoinHandle<Vec<u8>>) -> String {
    let bytes = task.await.unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}
