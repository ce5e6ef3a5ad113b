//! One-shot cancellation signal shared by every pipeline thread.
//!
//! The trigger owns the only sender of a zero-capacity channel that is never
//! written to. Dropping it disconnects the channel, which wakes every
//! `select!` waiting on the signal's receiver at once.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

pub struct ShutdownTrigger {
    _tx: Sender<()>,
}

#[derive(Clone)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

pub fn shutdown_pair() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = bounded(0);
    (ShutdownTrigger { _tx: tx }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    /// Request shutdown. Dropping the trigger has the same effect.
    pub fn trigger(self) {
        drop(self._tx);
    }
}

impl ShutdownSignal {
    pub fn is_requested(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Receiver to use inside `crossbeam_channel::select!`; it becomes ready
    /// (with an error) once shutdown is requested.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
