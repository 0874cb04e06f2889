use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::readiness::{PidFileMarker, ReadinessSource, WaitOutcome};
use crate::{ExitNotifier, ExitStatus, ProcessBuilder, ShutdownCause, Signal, UnitConfig};

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        let sanitized = Self::sanitize(&name);
        if sanitized.is_empty() {
            return Err(crate::Error::InvalidUnitName(name));
        }
        Ok(Self(sanitized))
    }

    fn sanitize(name: &str) -> String {
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect::<String>()
            .trim_matches('-')
            .to_string()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Starting,
    Ready,
    Running,
    Terminating,
    Exited,
}

impl UnitState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_exited(&self) -> bool {
        matches!(self, Self::Exited)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownIntent {
    /// Ask the unit to drain in-flight work before exiting.
    Graceful,
    /// Terminate immediately.
    Forceful,
}

/// One supervised task: a wrapped external process, or anything that can be
/// started, waited on for readiness, and torn down like one.
#[async_trait]
pub trait Supervised: Send {
    fn id(&self) -> &UnitId;

    fn state(&self) -> UnitState;

    /// Launch the unit. The notifier receives the unit's name when it exits,
    /// expectedly or not.
    async fn start(&mut self, notifier: ExitNotifier) -> crate::Result<()>;

    /// Resolve once the unit is ready. Units without a readiness marker are
    /// ready the moment they are launched.
    async fn await_ready(&mut self) -> WaitOutcome;

    /// Called by the supervisor once the whole session is up.
    fn mark_running(&self);

    /// Deliver a shutdown intent. No-op for a unit already terminating or
    /// exited; repeated delivery is idempotent.
    fn request_shutdown(&self, intent: ShutdownIntent);

    /// Resolve once the unit has fully exited. Returns immediately for a
    /// unit that was never started.
    async fn await_exit(&mut self);
}

/// A unit wrapping one external command. The spawned child and its pid are
/// owned by the unit's monitor task; everything else goes through the
/// `Supervised` API.
pub struct ProcessUnit {
    id: UnitId,
    config: UnitConfig,
    state: Arc<RwLock<UnitState>>,
    pid: Arc<RwLock<Option<u32>>>,
    last_exit: Arc<RwLock<Option<ExitStatus>>>,
    intent_tx: Option<mpsc::Sender<ShutdownIntent>>,
    exited_rx: Option<watch::Receiver<bool>>,
}

impl ProcessUnit {
    pub fn new(config: UnitConfig) -> crate::Result<Self> {
        let id = UnitId::new(&config.name)?;
        Ok(Self {
            id,
            config,
            state: Arc::new(RwLock::new(UnitState::Starting)),
            pid: Arc::new(RwLock::new(None)),
            last_exit: Arc::new(RwLock::new(None)),
            intent_tx: None,
            exited_rx: None,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        *self.pid.read()
    }

    pub fn last_exit(&self) -> Option<ExitStatus> {
        *self.last_exit.read()
    }

    fn set_state(&self, state: UnitState) {
        *self.state.write() = state;
    }
}

#[async_trait]
impl Supervised for ProcessUnit {
    fn id(&self) -> &UnitId {
        &self.id
    }

    fn state(&self) -> UnitState {
        *self.state.read()
    }

    async fn start(&mut self, notifier: ExitNotifier) -> crate::Result<()> {
        let mut builder = ProcessBuilder::new(self.config.command.as_str())
            .args(&self.config.args)
            .env_map(&self.config.env);
        if let Some(cwd) = &self.config.cwd {
            builder = builder.current_dir(cwd);
        }

        let child = builder.spawn()?;
        let pid = child.id().ok_or_else(|| {
            crate::Error::SpawnFailed(format!("{}: exited before a pid was available", self.id))
        })?;

        *self.pid.write() = Some(pid);
        self.set_state(UnitState::Starting);
        info!("unit {} started with pid {}", self.id, pid);

        let (intent_tx, intent_rx) = mpsc::channel(1);
        let (exited_tx, exited_rx) = watch::channel(false);
        self.intent_tx = Some(intent_tx);
        self.exited_rx = Some(exited_rx);

        let graceful = self.config.graceful_signal.unwrap_or(self.config.forceful_signal);
        let forceful = self.config.forceful_signal;

        tokio::spawn(monitor(
            self.id.clone(),
            child,
            pid,
            graceful,
            forceful,
            self.state.clone(),
            self.pid.clone(),
            self.last_exit.clone(),
            intent_rx,
            exited_tx,
            notifier,
        ));

        Ok(())
    }

    async fn await_ready(&mut self) -> WaitOutcome {
        let outcome = match &self.config.pid_file {
            None => WaitOutcome::Ready,
            Some(path) => {
                let marker =
                    PidFileMarker::new(path, self.config.startup, self.config.liveness);
                match self.pid() {
                    Some(pid) => marker.wait_or_death(pid).await,
                    None => marker.wait().await,
                }
            }
        };

        if outcome == WaitOutcome::Ready {
            let mut state = self.state.write();
            if *state == UnitState::Starting {
                *state = UnitState::Ready;
            }
        }
        outcome
    }

    fn mark_running(&self) {
        let mut state = self.state.write();
        if matches!(*state, UnitState::Starting | UnitState::Ready) {
            *state = UnitState::Running;
        }
    }

    fn request_shutdown(&self, intent: ShutdownIntent) {
        if matches!(self.state(), UnitState::Terminating | UnitState::Exited) {
            return;
        }
        if let Some(tx) = &self.intent_tx {
            // A full channel means an intent is already in flight.
            let _ = tx.try_send(intent);
        }
    }

    async fn await_exit(&mut self) {
        if let Some(rx) = self.exited_rx.as_mut() {
            let _ = rx.wait_for(|exited| *exited).await;
        }
    }
}

/// Per-unit monitoring loop: blocks until the child exits on its own or a
/// shutdown intent arrives; an intent is translated into the unit's graceful
/// or forceful signal and the loop keeps waiting for the real exit. Whatever
/// the path, the loop ends by posting the unit's name to the exit notifier.
#[allow(clippy::too_many_arguments)]
async fn monitor(
    id: UnitId,
    mut child: Child,
    pid: u32,
    graceful: Signal,
    forceful: Signal,
    state: Arc<RwLock<UnitState>>,
    pid_slot: Arc<RwLock<Option<u32>>>,
    last_exit: Arc<RwLock<Option<ExitStatus>>>,
    mut intent_rx: mpsc::Receiver<ShutdownIntent>,
    exited_tx: watch::Sender<bool>,
    notifier: ExitNotifier,
) {
    let mut intents_open = true;
    let mut signalled = false;

    let result = loop {
        tokio::select! {
            res = child.wait() => break res,
            intent = intent_rx.recv(), if intents_open => {
                match intent {
                    Some(intent) if !signalled => {
                        *state.write() = UnitState::Terminating;
                        let sig = match intent {
                            ShutdownIntent::Graceful => graceful,
                            ShutdownIntent::Forceful => forceful,
                        };
                        info!("stopping unit {} (pid {}) with {}", id, pid, sig);
                        deliver_signal(pid, sig);
                        signalled = true;
                        // The signal is not assumed synchronous: keep
                        // waiting for the child to actually exit.
                    }
                    Some(_) => {}
                    None => intents_open = false,
                }
            }
        }
    };

    match result {
        Ok(status) => {
            let status = ExitStatus::from_std(status);
            if signalled || status.success() {
                info!("unit {} exited with {}", id, status);
            } else {
                warn!("unit {} exited unexpectedly with {}", id, status);
            }
            *last_exit.write() = Some(status);
        }
        Err(e) => error!("failed waiting for unit {}: {}", id, e),
    }

    *pid_slot.write() = None;
    *state.write() = UnitState::Exited;
    notifier.post(ShutdownCause::UnitExited(id));
    let _ = exited_tx.send(true);
}

#[cfg(unix)]
fn deliver_signal(pid: u32, sig: Signal) {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), sig) {
        Ok(()) => {}
        // The process can be gone by the time the signal lands.
        Err(Errno::ESRCH) => debug!("pid {} already gone, nothing to signal", pid),
        Err(e) => warn!("failed to signal pid {}: {}", pid, e),
    }
}
