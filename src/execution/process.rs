//! Child-process plumbing shared by snippet execution and test runs.
//!
//! Output is read by background tasks into shared buffers, so whatever a
//! process printed before it was killed is still available afterwards.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long to keep reading pipes after the process is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// How a captured run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunStatus {
    /// The process exited; `None` when it was ended by a signal.
    Exited(Option<i32>),
    /// The timeout elapsed and the process was killed.
    TimedOut,
}

#[derive(Debug)]
pub(crate) struct CapturedRun {
    pub status: RunStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Spawns `command` with piped stdio, feeds it `stdin` and waits up to `timeout`.
///
/// Returns `Err` only when the process could not be spawned or waited on.
pub(crate) async fn run_captured(
    mut command: Command,
    stdin: Option<String>,
    timeout: Duration,
) -> std::io::Result<CapturedRun> {
    let start = Instant::now();
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;

    let writer = child.stdin.take().map(|mut pipe| {
        let input = stdin.unwrap_or_default();
        tokio::spawn(async move {
            if !input.is_empty() {
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    debug!("stdin closed early: {}", e);
                }
            }
            let _ = pipe.shutdown().await;
        })
    });
    let (stdout_buf, stdout_task) = capture(child.stdout.take());
    let (stderr_buf, stderr_task) = capture(child.stderr.take());

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => RunStatus::Exited(status.code()),
        Ok(Err(e)) => {
            let _ = child.start_kill();
            abort_all([writer, stdout_task, stderr_task]);
            return Err(e);
        }
        Err(_) => {
            warn!("Process exceeded {:?}, killing it", timeout);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill timed-out process: {}", e);
            }
            RunStatus::TimedOut
        }
    };

    if let Some(writer) = writer {
        writer.abort();
    }
    drain(stdout_task).await;
    drain(stderr_task).await;

    Ok(CapturedRun {
        status,
        stdout: take(&stdout_buf),
        stderr: take(&stderr_buf),
        duration: start.elapsed(),
    })
}

fn capture<R>(reader: Option<R>) -> (SharedBuffer, Option<JoinHandle<()>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = SharedBuffer::default();
    let task = reader.map(|mut reader| {
        let sink = Arc::clone(&buffer);
        tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = sink.lock() {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                    Err(e) => {
                        debug!("pipe read failed: {}", e);
                        break;
                    }
                }
            }
        })
    });
    (buffer, task)
}

async fn drain(task: Option<JoinHandle<()>>) {
    if let Some(mut task) = task {
        if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
            task.abort();
        }
    }
}

fn abort_all<const N: usize>(tasks: [Option<JoinHandle<()>>; N]) {
    for task in tasks.into_iter().flatten() {
        task.abort();
    }
}

fn take(buffer: &SharedBuffer) -> String {
    let bytes = buffer
        .lock()
        .map(|mut buf| std::mem::take(&mut *buf))
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}
