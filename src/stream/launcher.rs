//! Spawning the encoder and reporting how it ended.
//!
//! [`EncoderLauncher`] is the seam between the supervisor and the operating
//! system: the supervisor only sees a pid, an interrupt switch and a
//! one-shot exit notification.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use super::invocation::{parse_progress, EncoderInvocation, EncoderProgress};
use super::{Result, StreamError};

/// How long ffmpeg gets to flush and close the RTMP connection after SIGINT.
const STOP_GRACE: Duration = Duration::from_secs(10);

/// Why an encoder process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Clean exit, or an exit we asked for.
    Expected,
    /// Non-zero exit code, or killed by a signal we did not send (`code: None`).
    Abnormal { code: Option<i32> },
}

/// Sends the stop request to a running encoder. Dropping it also stops the encoder.
#[derive(Debug)]
pub struct InterruptHandle(Option<oneshot::Sender<()>>);

impl InterruptHandle {
    #[must_use]
    pub fn new(tx: oneshot::Sender<()>) -> Self {
        Self(Some(tx))
    }

    /// Ask the encoder to stop. Does not wait for it to exit.
    pub fn interrupt(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// A freshly spawned encoder.
#[derive(Debug)]
pub struct EncoderProcess {
    pub pid: Option<u32>,
    pub interrupt: InterruptHandle,
    /// Resolves exactly once when the process has exited.
    pub exited: oneshot::Receiver<ExitReason>,
}

/// Starts encoder processes.
///
/// `launch` is synchronous so the supervisor can check-and-spawn without
/// yielding between the check and the state update.
pub trait EncoderLauncher: Send + Sync {
    fn launch(&self, invocation: EncoderInvocation) -> Result<EncoderProcess>;
}

/// Launches ffmpeg with `tokio::process`, draining its output and
/// publishing progress from its `-stats` lines.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    progress: Arc<watch::Sender<Option<EncoderProgress>>>,
}

impl FfmpegLauncher {
    #[must_use]
    pub fn new() -> Self {
        let (progress, _) = watch::channel(None);
        Self {
            progress: Arc::new(progress),
        }
    }

    /// Latest encoder progress of the current process, if any.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<Option<EncoderProgress>> {
        self.progress.subscribe()
    }

    /// Check if ffmpeg is available
    pub async fn check_available(ffmpeg_path: &str) -> bool {
        Command::new(ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderLauncher for FfmpegLauncher {
    fn launch(&self, invocation: EncoderInvocation) -> Result<EncoderProcess> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(StreamError::Spawn)?;

        let pid = child.id();
        info!("ffmpeg started (pid {:?})", pid);
        self.progress.send_replace(None);

        if let Some(mut stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let _ = tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await;
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr, Arc::clone(&self.progress)));
        }

        let (interrupt_tx, interrupt_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(async move {
            // Holding the invocation keeps a playlist file alive for the run.
            let _invocation = invocation;
            let reason = wait_for_exit(child, interrupt_rx).await;
            let _ = exit_tx.send(reason);
        });

        Ok(EncoderProcess {
            pid,
            interrupt: InterruptHandle::new(interrupt_tx),
            exited: exit_rx,
        })
    }
}

/// Wait for the child, interrupting it if asked to (or if the handle is dropped).
async fn wait_for_exit(mut child: Child, interrupt: oneshot::Receiver<()>) -> ExitReason {
    tokio::select! {
        status = child.wait() => return classify(status),
        _ = interrupt => {}
    }

    send_interrupt(&mut child);
    match tokio::time::timeout(STOP_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!("ffmpeg stopped: {status}"),
        Ok(Err(e)) => warn!("failed to reap ffmpeg: {e}"),
        Err(_) => {
            warn!("ffmpeg ignored SIGINT for {:?}, killing", STOP_GRACE);
            let _ = child.kill().await;
        }
    }
    ExitReason::Expected
}

fn classify(status: std::io::Result<ExitStatus>) -> ExitReason {
    match status {
        Ok(status) if status.success() => ExitReason::Expected,
        Ok(status) => ExitReason::Abnormal {
            code: status.code(),
        },
        Err(e) => {
            warn!("failed to wait for ffmpeg: {e}");
            ExitReason::Abnormal { code: None }
        }
    }
}

/// SIGINT lets ffmpeg finish the FLV stream cleanly.
#[cfg(unix)]
fn send_interrupt(child: &mut Child) {
    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        // SAFETY: kill(2) has no memory-safety preconditions; pid is our own child.
        if unsafe { libc::kill(pid, libc::SIGINT) } == 0 {
            return;
        }
    }
    let _ = child.start_kill();
}

#[cfg(not(unix))]
fn send_interrupt(child: &mut Child) {
    let _ = child.start_kill();
}

/// Drain stderr, logging warnings and publishing progress.
///
/// `-stats` lines end in `\r`, so segments are split on both `\r` and `\n`
/// to keep the buffer bounded.
async fn drain_stderr(stderr: ChildStderr, progress: Arc<watch::Sender<Option<EncoderProgress>>>) {
    let mut segments = BufReader::new(stderr).split(b'\r');

    while let Ok(Some(segment)) = segments.next_segment().await {
        let segment = String::from_utf8_lossy(&segment);
        for line in segment.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(prog) = parse_progress(line) {
                progress.send_replace(Some(prog));
            } else if line.contains("Error") || line.contains("error") || line.contains("Warning") {
                warn!("ffmpeg: {}", line);
            } else {
                debug!("ffmpeg: {}", line);
            }
        }
    }
}
