use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};

use stackctl_core::{
    ExitNotifier, ExitReceiver, ProcessUnit, SessionConfig, ShutdownCause, ShutdownIntent, Signal,
    Supervised, UnitId, WaitOutcome, exit_channel,
};
use stackctl_logging::LogMultiplexer;

// sysexits.h conventions: EX_SOFTWARE for a unit dying on us, EX_CONFIG for
// configuration problems. External signals re-raise instead.
pub const EXIT_SOFTWARE: i32 = 70;
pub const EXIT_CONFIG: i32 = 78;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Launching,
    Running,
    ShuttingDown,
    Done,
}

/// How the session ended. Mapped onto the process exit-code policy in main.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every unit exited without external prompting and without failure.
    Completed,
    /// A unit exited on its own, or never became ready.
    UnexpectedExit(UnitId),
    /// An external signal was translated into the shutdown.
    Signalled(Signal),
}

impl SessionOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::UnexpectedExit(_) => EXIT_SOFTWARE,
            Self::Signalled(sig) => 128 + *sig as i32,
        }
    }
}

/// One supervision session: the ordered unit set, the graceful preference,
/// and the single-slot exit channel the main loop blocks on. Created once
/// per invocation, never reused.
pub struct SupervisionSession {
    units: Vec<Box<dyn Supervised>>,
    marker_files: Vec<PathBuf>,
    graceful_preferred: bool,
    state: SessionState,
    notifier: ExitNotifier,
    receiver: Option<ExitReceiver>,
}

impl SupervisionSession {
    /// Build the ordered unit set: the log pipeline first, so it outlives
    /// the servers during teardown, then the configured units in
    /// registration order.
    pub fn build(config: &SessionConfig) -> stackctl_core::Result<Self> {
        config.validate()?;
        let (notifier, receiver) = exit_channel();

        let mut units: Vec<Box<dyn Supervised>> = Vec::new();
        if !config.log_globs.is_empty() {
            let mux = LogMultiplexer::to_stdout(
                &config.log_globs,
                Duration::from_millis(config.log_poll_ms),
            )?;
            units.push(Box::new(mux));
        }

        let mut marker_files = Vec::new();
        for unit_config in &config.units {
            if let Some(path) = &unit_config.pid_file {
                marker_files.push(path.clone());
            }
            units.push(Box::new(ProcessUnit::new(unit_config.clone())?));
        }

        Ok(Self {
            units,
            marker_files,
            graceful_preferred: config.graceful_shutdown,
            state: SessionState::Launching,
            notifier,
            receiver: Some(receiver),
        })
    }

    pub async fn run(mut self) -> stackctl_core::Result<SessionOutcome> {
        self.install_signal_translation()?;

        let intent = self.preferred_intent();
        let notifier = self.notifier.clone();
        let mut started = 0usize;

        for index in 0..self.units.len() {
            let id = self.units[index].id().clone();
            info!("starting unit {}", id);
            if let Err(e) = self.units[index].start(notifier.clone()).await {
                error!("unit {} failed to start: {}", id, e);
                self.shutdown(started, intent).await;
                return Ok(SessionOutcome::UnexpectedExit(id));
            }
            started += 1;

            // Each unit must be ready before the next one launches; the
            // front server is gated on the app server this way.
            match self.units[index].await_ready().await {
                WaitOutcome::Ready => info!("unit {} ready", id),
                WaitOutcome::TimedOut => {
                    error!("unit {} did not become ready in time", id);
                    self.shutdown(started, intent).await;
                    return Ok(SessionOutcome::UnexpectedExit(id));
                }
                WaitOutcome::Died => {
                    error!("unit {} died before becoming ready", id);
                    self.shutdown(started, intent).await;
                    return Ok(SessionOutcome::UnexpectedExit(id));
                }
            }
        }

        for unit in &self.units {
            unit.mark_running();
        }
        self.set_state(SessionState::Running);
        info!("all units running");

        let Some(receiver) = self.receiver.take() else {
            return Err(stackctl_core::Error::Signal(
                "exit receiver already consumed".to_string(),
            ));
        };

        // The one blocking receive of the session. Whatever posts first
        // (a unit exiting, or a translated signal) drives the teardown;
        // later posts are dropped by the slot.
        let outcome = match receiver.recv().await {
            Some(ShutdownCause::UnitExited(id)) => {
                warn!("shutting down: unit {} exited", id);
                SessionOutcome::UnexpectedExit(id)
            }
            Some(ShutdownCause::Signal(sig)) => {
                info!("shutting down: received {}", sig);
                SessionOutcome::Signalled(sig)
            }
            None => SessionOutcome::Completed,
        };

        self.shutdown(started, intent).await;
        Ok(outcome)
    }

    /// Reverse-order teardown: unit k is not signaled until unit k+1 has
    /// fully exited. The log pipeline, launched first, stops last.
    async fn shutdown(&mut self, started: usize, intent: ShutdownIntent) {
        self.set_state(SessionState::ShuttingDown);
        for unit in self.units[..started].iter_mut().rev() {
            let id = unit.id().clone();
            info!("stopping unit {}", id);
            unit.request_shutdown(intent);
            unit.await_exit().await;
            info!("unit {} stopped", id);
        }
        self.cleanup().await;
        self.set_state(SessionState::Done);
        info!("supervision session complete");
    }

    async fn cleanup(&self) {
        for path in &self.marker_files {
            // Markers are often removed by the servers themselves; a missing
            // file is the common case.
            if tokio::fs::remove_file(path).await.is_ok() {
                debug!("removed leftover marker {:?}", path);
            }
        }
    }

    fn preferred_intent(&self) -> ShutdownIntent {
        if self.graceful_preferred {
            ShutdownIntent::Graceful
        } else {
            ShutdownIntent::Forceful
        }
    }

    fn set_state(&mut self, next: SessionState) {
        debug!("session state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Translate external signals into shutdown causes on the session's
    /// exit channel. SIGTERM is always honored; SIGINT only when attached
    /// to a terminal, since a supervising parent sends SIGTERM instead.
    fn install_signal_translation(&self) -> stackctl_core::Result<()> {
        let notifier = self.notifier.clone();

        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            stackctl_core::Error::Signal(format!("cannot install SIGTERM handler: {e}"))
        })?;

        let mut sigint = if std::io::stdin().is_terminal() {
            Some(signal(SignalKind::interrupt()).map_err(|e| {
                stackctl_core::Error::Signal(format!("cannot install SIGINT handler: {e}"))
            })?)
        } else {
            None
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sigterm.recv() => {
                        notifier.post(ShutdownCause::Signal(Signal::SIGTERM));
                    }
                    _ = async {
                        match sigint.as_mut() {
                            Some(stream) => stream.recv().await,
                            None => std::future::pending::<Option<()>>().await,
                        }
                    } => {
                        notifier.post(ShutdownCause::Signal(Signal::SIGINT));
                    }
                }
            }
        });

        Ok(())
    }
}
