//! Shutdown signals that tests can fire on demand.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::process::ShutdownSignal;

/// Signal released when its [`SignalTrigger`] fires or is dropped.
#[derive(Debug)]
pub struct ManualShutdownSignal {
    receiver: Receiver<()>,
}

/// Sending half of a [`ManualShutdownSignal`].
#[derive(Debug, Clone)]
pub struct SignalTrigger {
    sender: Sender<()>,
}

impl ManualShutdownSignal {
    #[must_use]
    pub fn new() -> (Self, SignalTrigger) {
        let (sender, receiver) = mpsc::channel();
        (Self { receiver }, SignalTrigger { sender })
    }
}

impl SignalTrigger {
    /// Releases the waiting signal thread.
    pub fn fire(&self) {
        self.sender.send(()).ok();
    }
}

impl ShutdownSignal for ManualShutdownSignal {
    fn wait(&mut self) {
        self.receiver.recv().ok();
    }
}
