mod tailer;
mod transform;

pub use transform::rewrite_truncated_quote;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use stackctl_core::{
    Error, ExitNotifier, Result, ShutdownCause, ShutdownIntent, Supervised, UnitId, UnitState,
    WaitOutcome,
};

/// Where the multiplexed lines go. Production uses the process's own stdout;
/// tests substitute an in-memory stream.
pub type DiagnosticSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Expand log glob patterns into the concrete file set to follow. Matching
/// zero files is a configuration error, not a silent no-op.
pub fn expand_globs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let entries = glob::glob(pattern)
            .map_err(|e| Error::Config(format!("bad log pattern {pattern}: {e}")))?;
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => warn!("skipping unreadable log path: {}", e),
            }
        }
    }
    files.sort();
    files.dedup();
    if files.is_empty() {
        return Err(Error::Config(format!(
            "log patterns matched no files: {patterns:?}"
        )));
    }
    Ok(files)
}

/// Two-stage streaming pipeline forwarding a set of growing log files to one
/// diagnostic stream: tailer tasks (one per file) feed a line channel, a
/// transformer task rewrites and emits. Supervised like any other unit, but
/// shutdown is forceful-equivalent: there is no drain semantic beyond
/// flushing lines already buffered in the channel.
pub struct LogMultiplexer {
    id: UnitId,
    files: Vec<PathBuf>,
    poll: Duration,
    sink: Option<DiagnosticSink>,
    state: Arc<RwLock<UnitState>>,
    stop_tx: Option<watch::Sender<bool>>,
    exited_rx: Option<watch::Receiver<bool>>,
}

impl LogMultiplexer {
    pub fn new(patterns: &[String], poll: Duration, sink: DiagnosticSink) -> Result<Self> {
        let files = expand_globs(patterns)?;
        Ok(Self {
            id: UnitId::new("logs")?,
            files,
            poll,
            sink: Some(sink),
            state: Arc::new(RwLock::new(UnitState::Starting)),
            stop_tx: None,
            exited_rx: None,
        })
    }

    pub fn to_stdout(patterns: &[String], poll: Duration) -> Result<Self> {
        Self::new(patterns, poll, Box::new(tokio::io::stdout()))
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

#[async_trait]
impl Supervised for LogMultiplexer {
    fn id(&self) -> &UnitId {
        &self.id
    }

    fn state(&self) -> UnitState {
        *self.state.read()
    }

    async fn start(&mut self, notifier: ExitNotifier) -> Result<()> {
        let sink = self
            .sink
            .take()
            .ok_or_else(|| Error::Config("log multiplexer already started".to_string()))?;

        let (line_tx, line_rx) = mpsc::channel::<String>(1024);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (exited_tx, exited_rx) = watch::channel(false);
        self.stop_tx = Some(stop_tx);
        self.exited_rx = Some(exited_rx);

        for path in &self.files {
            tokio::spawn(tailer::tail_file(
                path.clone(),
                self.poll,
                line_tx.clone(),
                stop_rx.clone(),
            ));
        }
        // The transformer ends when the last tailer drops its sender.
        drop(line_tx);

        let id = self.id.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            transform::pump(line_rx, sink).await;
            debug!("log multiplexer drained");
            *state.write() = UnitState::Exited;
            notifier.post(ShutdownCause::UnitExited(id));
            let _ = exited_tx.send(true);
        });

        info!("unit {} following {} log file(s)", self.id, self.files.len());
        Ok(())
    }

    async fn await_ready(&mut self) -> WaitOutcome {
        let mut state = self.state.write();
        if *state == UnitState::Starting {
            *state = UnitState::Ready;
        }
        WaitOutcome::Ready
    }

    fn mark_running(&self) {
        let mut state = self.state.write();
        if matches!(*state, UnitState::Starting | UnitState::Ready) {
            *state = UnitState::Running;
        }
    }

    fn request_shutdown(&self, _intent: ShutdownIntent) {
        {
            let mut state = self.state.write();
            if matches!(*state, UnitState::Terminating | UnitState::Exited) {
                return;
            }
            *state = UnitState::Terminating;
        }
        if let Some(tx) = &self.stop_tx {
            let _ = tx.send(true);
        }
    }

    async fn await_exit(&mut self) {
        if let Some(rx) = self.exited_rx.as_mut() {
            let _ = rx.wait_for(|exited| *exited).await;
        }
    }
}
