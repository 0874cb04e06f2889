use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace};

/// Bounds for one polling wait. The reference configuration polls every
/// 100ms for up to 25 attempts, i.e. 2.5s total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBounds {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollBounds {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_attempts: 25,
        }
    }
}

impl PollBounds {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The readiness marker exists.
    Ready,
    /// The marker did not appear within the configured bounds.
    TimedOut,
    /// The process that was supposed to produce the marker is gone.
    Died,
}

/// Where a unit's readiness comes from. Kept as a trait so a socket probe or
/// an explicit callback can replace the pid-file marker without touching the
/// supervisor.
#[async_trait]
pub trait ReadinessSource: Send + Sync {
    /// Wait for readiness. Never returns `Died`.
    async fn wait(&self) -> WaitOutcome;

    /// Wait for readiness while also watching the owning process; returns
    /// `Died` as soon as the process is gone, instead of running out the
    /// full timeout.
    async fn wait_or_death(&self, pid: u32) -> WaitOutcome;
}

/// Readiness signaled by the existence of a file, typically the pid file the
/// supervised server writes once it has finished booting. Only existence
/// matters, not content.
///
/// The marker wait and the died-before-marker wait carry independent bounds:
/// a slow boot and a crashed boot are different failure kinds even though
/// both surface as "no marker yet".
#[derive(Debug, Clone)]
pub struct PidFileMarker {
    path: PathBuf,
    startup: PollBounds,
    liveness: PollBounds,
}

impl PidFileMarker {
    pub fn new(path: impl AsRef<Path>, startup: PollBounds, liveness: PollBounds) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            startup,
            liveness,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn process_alive(pid: u32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // Zero-signal probe: delivers nothing, only checks existence.
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }
}

#[async_trait]
impl ReadinessSource for PidFileMarker {
    async fn wait(&self) -> WaitOutcome {
        for attempt in 0..self.startup.max_attempts {
            if self.path.exists() {
                trace!("marker {:?} present after {} polls", self.path, attempt);
                return WaitOutcome::Ready;
            }
            tokio::time::sleep(self.startup.interval).await;
        }
        debug!(
            "marker {:?} absent after {} polls at {:?}",
            self.path, self.startup.max_attempts, self.startup.interval
        );
        WaitOutcome::TimedOut
    }

    async fn wait_or_death(&self, pid: u32) -> WaitOutcome {
        for attempt in 0..self.liveness.max_attempts {
            if self.path.exists() {
                trace!("marker {:?} present after {} polls", self.path, attempt);
                return WaitOutcome::Ready;
            }
            if !Self::process_alive(pid) {
                debug!("pid {} died before marker {:?} appeared", pid, self.path);
                return WaitOutcome::Died;
            }
            tokio::time::sleep(self.liveness.interval).await;
        }
        debug!(
            "marker {:?} absent after {} polls at {:?} (pid {} still alive)",
            self.path, self.liveness.max_attempts, self.liveness.interval, pid
        );
        WaitOutcome::TimedOut
    }
}
