//! Structured health reporting for agent lifecycle events.

use std::sync::Arc;

use tether_config::Config;

use crate::bootstrap::BootstrapError;
use crate::channel::ChannelId;
use crate::peer::PeerDescriptor;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
///
/// Worker events arrive on the dispatcher thread, as do all channel and
/// server events.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once a channel server is accepting connections.
    fn server_listening(&self, peer: &PeerDescriptor);

    /// Invoked when a channel server cannot be created or fails while
    /// accepting.
    fn server_failed(&self, locator: &str, error: &str);

    /// Invoked when a channel server is closed.
    fn server_closed(&self, peer: &PeerDescriptor);

    /// Invoked when a transport constructs a channel.
    fn channel_created(&self, channel: ChannelId, peer: &str);

    /// Invoked when a channel completes its handshake.
    fn channel_opened(&self, channel: ChannelId, peer: &str);

    /// Invoked when a channel is closed.
    fn channel_closed(&self, channel: ChannelId, peer: &str);

    /// Invoked after an executor worker thread starts.
    fn worker_spawned(&self, worker: usize, running: usize);

    /// Invoked after an executor worker thread has been joined.
    fn worker_exited(&self, worker: usize, running: usize);

    /// Invoked once the executor has no workers left after shutdown.
    fn executor_stopped(&self);

    /// Invoked when agent shutdown begins.
    fn shutdown_requested(&self);

    /// Invoked when shutdown finishes; `clean` is `false` on timeout.
    fn shutdown_completed(&self, clean: bool);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn server_listening(&self, peer: &PeerDescriptor) {
        (**self).server_listening(peer);
    }

    fn server_failed(&self, locator: &str, error: &str) {
        (**self).server_failed(locator, error);
    }

    fn server_closed(&self, peer: &PeerDescriptor) {
        (**self).server_closed(peer);
    }

    fn channel_created(&self, channel: ChannelId, peer: &str) {
        (**self).channel_created(channel, peer);
    }

    fn channel_opened(&self, channel: ChannelId, peer: &str) {
        (**self).channel_opened(channel, peer);
    }

    fn channel_closed(&self, channel: ChannelId, peer: &str) {
        (**self).channel_closed(channel, peer);
    }

    fn worker_spawned(&self, worker: usize, running: usize) {
        (**self).worker_spawned(worker, running);
    }

    fn worker_exited(&self, worker: usize, running: usize) {
        (**self).worker_exited(worker, running);
    }

    fn executor_stopped(&self) {
        (**self).executor_stopped();
    }

    fn shutdown_requested(&self) {
        (**self).shutdown_requested();
    }

    fn shutdown_completed(&self, clean: bool) {
        (**self).shutdown_completed(clean);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting agent bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            listen = ?config.listen(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            max_workers = config.executor().max_workers,
            "agent bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "agent bootstrap failed"
        );
    }

    fn server_listening(&self, peer: &PeerDescriptor) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_listening",
            properties = %peer,
            "channel server listening"
        );
    }

    fn server_failed(&self, locator: &str, error: &str) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "server_failed",
            locator,
            error,
            "channel server failed"
        );
    }

    fn server_closed(&self, peer: &PeerDescriptor) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_closed",
            properties = %peer,
            "channel server closed"
        );
    }

    fn channel_created(&self, channel: ChannelId, peer: &str) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "channel_created",
            channel = %channel,
            peer,
            "channel created"
        );
    }

    fn channel_opened(&self, channel: ChannelId, peer: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "channel_opened",
            channel = %channel,
            peer,
            "channel opened"
        );
    }

    fn channel_closed(&self, channel: ChannelId, peer: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "channel_closed",
            channel = %channel,
            peer,
            "channel closed"
        );
    }

    fn worker_spawned(&self, worker: usize, running: usize) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "worker_spawned",
            worker,
            running,
            "executor worker spawned"
        );
    }

    fn worker_exited(&self, worker: usize, running: usize) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "worker_exited",
            worker,
            running,
            "executor worker exited"
        );
    }

    fn executor_stopped(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "executor_stopped",
            "executor stopped"
        );
    }

    fn shutdown_requested(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_requested",
            "agent shutdown requested"
        );
    }

    fn shutdown_completed(&self, clean: bool) {
        if clean {
            tracing::info!(
                target: HEALTH_TARGET,
                event = "shutdown_completed",
                clean,
                "agent shutdown completed"
            );
        } else {
            tracing::warn!(
                target: HEALTH_TARGET,
                event = "shutdown_completed",
                clean,
                "agent shutdown timed out"
            );
        }
    }
}
