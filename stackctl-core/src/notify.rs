use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::trace;

use crate::{Signal, UnitId};

/// What ended the session: some unit reached `Exited`, or an external signal
/// was translated into a shutdown request. Both kinds travel through the
/// same slot so the main loop has a single rendezvous point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    UnitExited(UnitId),
    Signal(Signal),
}

impl std::fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnitExited(id) => write!(f, "unit {id} exited"),
            Self::Signal(sig) => write!(f, "received {sig}"),
        }
    }
}

/// Create the session's single-slot exit channel. The first post wins; every
/// later post is dropped. The receiver side supports exactly one receive.
pub fn exit_channel() -> (ExitNotifier, ExitReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (
        ExitNotifier {
            tx,
            posted: Arc::new(AtomicBool::new(false)),
        },
        ExitReceiver { rx },
    )
}

#[derive(Debug, Clone)]
pub struct ExitNotifier {
    tx: mpsc::Sender<ShutdownCause>,
    posted: Arc<AtomicBool>,
}

impl ExitNotifier {
    /// Post a shutdown cause. Returns true if this post won the slot. Posts
    /// after the slot is filled are expected during teardown and dropped.
    pub fn post(&self, cause: ShutdownCause) -> bool {
        if self.posted.swap(true, Ordering::SeqCst) {
            trace!("exit slot already filled, dropping: {cause}");
            return false;
        }
        // Capacity 1 and the atomic gate guarantee this send fits.
        let _ = self.tx.try_send(cause);
        true
    }

    pub fn has_fired(&self) -> bool {
        self.posted.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ExitReceiver {
    rx: mpsc::Receiver<ShutdownCause>,
}

impl ExitReceiver {
    /// Block until a cause is posted. Consumes the receiver: one receive per
    /// session. Returns `None` only if every notifier handle was dropped
    /// without a post, which a running session never does.
    pub async fn recv(mut self) -> Option<ShutdownCause> {
        self.rx.recv().await
    }
}
