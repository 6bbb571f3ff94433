//! Test double for [`HealthReporter`] that records structured events for assertions.
//!
//! The recorder captures the lifecycle telemetry emitted by bootstrap, the
//! executor, channels and servers so behaviour tests can validate observable
//! events.

use std::sync::Mutex;

use tether_config::Config;

use crate::bootstrap::BootstrapError;
use crate::channel::ChannelId;
use crate::health::HealthReporter;
use crate::peer::PeerDescriptor;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    ServerListening(String),
    ServerFailed { locator: String, error: String },
    ServerClosed(String),
    ChannelCreated(ChannelId),
    ChannelOpened(ChannelId),
    ChannelClosed(ChannelId),
    WorkerSpawned(usize),
    WorkerExited(usize),
    ExecutorStopped,
    ShutdownRequested,
    ShutdownCompleted { clean: bool },
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Counts the recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&HealthEvent) -> bool) -> usize {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .iter()
            .filter(|event| predicate(event))
            .count()
    }

    pub fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn server_listening(&self, peer: &PeerDescriptor) {
        self.record(HealthEvent::ServerListening(peer.to_json()));
    }

    fn server_failed(&self, locator: &str, error: &str) {
        self.record(HealthEvent::ServerFailed {
            locator: locator.to_owned(),
            error: error.to_owned(),
        });
    }

    fn server_closed(&self, peer: &PeerDescriptor) {
        self.record(HealthEvent::ServerClosed(peer.to_json()));
    }

    fn channel_created(&self, channel: ChannelId, _peer: &str) {
        self.record(HealthEvent::ChannelCreated(channel));
    }

    fn channel_opened(&self, channel: ChannelId, _peer: &str) {
        self.record(HealthEvent::ChannelOpened(channel));
    }

    fn channel_closed(&self, channel: ChannelId, _peer: &str) {
        self.record(HealthEvent::ChannelClosed(channel));
    }

    fn worker_spawned(&self, worker: usize, _running: usize) {
        self.record(HealthEvent::WorkerSpawned(worker));
    }

    fn worker_exited(&self, worker: usize, _running: usize) {
        self.record(HealthEvent::WorkerExited(worker));
    }

    fn executor_stopped(&self) {
        self.record(HealthEvent::ExecutorStopped);
    }

    fn shutdown_requested(&self) {
        self.record(HealthEvent::ShutdownRequested);
    }

    fn shutdown_completed(&self, clean: bool) {
        self.record(HealthEvent::ShutdownCompleted { clean });
    }
}
