//! Console draining.
//!
//! [`ConsoleDrain`] forwards the container's stdout and stderr to the log as
//! they arrive, so the daemon's buffers never fill up while tests run. Lines
//! are logged under the `stashtest::runtime` target: stdout at `debug`,
//! stderr at `warn`.
//!
//! When the log stream ends the container has exited; the drain cancels its
//! [`exited`](ConsoleDrain::exited) token so readiness polling can stop early.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use stashtest_core::metrics as m;

use crate::docker::{ConsoleLine, ConsoleStream};

/// How long shutdown waits for the drain task before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Background task that logs container console output.
pub struct ConsoleDrain {
    handle: Option<JoinHandle<u64>>,
    cancel: CancellationToken,
    exited: CancellationToken,
}

impl ConsoleDrain {
    /// Spawns the drain task over a console line receiver.
    pub fn spawn(mut lines: mpsc::Receiver<ConsoleLine>) -> Self {
        let cancel = CancellationToken::new();
        let exited = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task_exited = exited.clone();
        let handle = tokio::spawn(async move {
            let mut forwarded = 0u64;
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    line = lines.recv() => match line {
                        Some(line) => {
                            forward(&line);
                            forwarded += 1;
                        }
                        None => {
                            debug!("container console closed");
                            task_exited.cancel();
                            break;
                        }
                    },
                }
            }
            forwarded
        });

        Self {
            handle: Some(handle),
            cancel,
            exited,
        }
    }

    /// Token cancelled once the container's console stream ends.
    pub fn exited(&self) -> CancellationToken {
        self.exited.clone()
    }

    /// Whether the console stream has ended.
    pub fn has_exited(&self) -> bool {
        self.exited.is_cancelled()
    }

    /// Stops the drain and returns how many lines it forwarded.
    ///
    /// Safe to call more than once; later calls return 0.
    pub async fn shutdown(&mut self) -> u64 {
        self.cancel.cancel();
        let Some(mut handle) = self.handle.take() else {
            return 0;
        };

        match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
            Ok(Ok(forwarded)) => forwarded,
            Ok(Err(e)) => {
                warn!(error = %e, "console drain task failed");
                0
            }
            Err(_) => {
                warn!("console drain did not stop in time, aborting");
                handle.abort();
                0
            }
        }
    }
}

impl Drop for ConsoleDrain {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn forward(line: &ConsoleLine) {
    match line.stream {
        ConsoleStream::Stdout => debug!(target: "stashtest::runtime", "{}", line.text),
        ConsoleStream::Stderr => warn!(target: "stashtest::runtime", "{}", line.text),
    }
    metrics::counter!(m::RUNTIME_CONSOLE_LINES_TOTAL, m::LABEL_STREAM => line.stream.to_string())
        .increment(1);
}
