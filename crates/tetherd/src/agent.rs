//! Dispatcher-owned agent context.
//!
//! The [`Agent`] holds every piece of state that only the dispatcher thread
//! may touch: channels, broadcast groups, listener lists, servers, pending
//! connects and the shutdown registry. Callbacks posted to the dispatcher
//! receive it as `&mut Agent`.

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tether_config::ExecutorSettings;
use tracing::{debug, info, warn};

use crate::asyncreq::Executor;
use crate::channel::{ChannelListeners, ChannelRegistry};
use crate::dispatcher::Poster;
use crate::health::HealthReporter;
use crate::peer::{HostIdentity, LocatorError, PeerDescriptor, parse_locator_with};
use crate::shutdown::{ShutdownRegistry, ShutdownTracker};
use crate::transport::{PendingConnects, ServerRegistry};

const AGENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::agent");

/// Longest time shutdown waits for subsystems before giving up.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// How the agent's shutdown ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every subsystem reported stopped.
    Clean,
    /// The shutdown budget ran out; `outstanding` names the subsystems still
    /// running.
    TimedOut { outstanding: Vec<&'static str> },
}

/// Process-scoped context for the transport core.
pub struct Agent {
    pub(crate) identity: HostIdentity,
    pub(crate) poster: Poster<Self>,
    pub(crate) executor: Executor<Self>,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) channels: ChannelRegistry,
    pub(crate) listeners: ChannelListeners,
    pub(crate) servers: ServerRegistry,
    pub(crate) connects: PendingConnects,
    shutdown: ShutdownRegistry<Self>,
    channels_tracker: ShutdownTracker,
    shutting_down: bool,
    shutdown_timeout: Duration,
    shutdown_started: Option<Instant>,
    shutdown_outcome: Option<ShutdownOutcome>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("identity", &self.identity)
            .field("executor", &self.executor)
            .field("channels", &self.channels.len())
            .field("servers", &self.servers.len())
            .field("connects", &self.connects.len())
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Builds the context for the dispatcher behind `poster`.
    ///
    /// Registers the `channels` and `asyncreq` shutdown hooks, in that order:
    /// closing channels and servers first lets their outstanding requests
    /// finish before the workers drain.
    #[must_use]
    pub fn new(
        poster: Poster<Self>,
        settings: ExecutorSettings,
        identity: HostIdentity,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        let executor = Executor::new(poster.clone(), settings, Arc::clone(&reporter));
        let channels_tracker = ShutdownTracker::new();
        let mut shutdown = ShutdownRegistry::default();
        shutdown.register("channels", channels_tracker.clone(), Self::close_all);
        shutdown.register("asyncreq", executor.tracker(), |agent: &mut Self| {
            agent.executor.trigger_shutdown();
        });
        Self {
            identity,
            poster,
            executor,
            reporter,
            channels: ChannelRegistry::default(),
            listeners: ChannelListeners::default(),
            servers: ServerRegistry::default(),
            connects: PendingConnects::default(),
            shutdown,
            channels_tracker,
            shutting_down: false,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            shutdown_started: None,
            shutdown_outcome: None,
        }
    }

    /// Overrides the shutdown budget.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Identity advertised in parsed locators.
    #[must_use]
    pub const fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    /// Handle for posting work back onto the dispatcher.
    #[must_use]
    pub const fn poster(&self) -> &Poster<Self> {
        &self.poster
    }

    /// Worker pool shared by every transport.
    #[must_use]
    pub const fn executor(&self) -> &Executor<Self> {
        &self.executor
    }

    /// Live channels and broadcast groups.
    #[must_use]
    pub const fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Live channel servers.
    #[must_use]
    pub const fn servers(&self) -> &ServerRegistry {
        &self.servers
    }

    /// Connects still waiting for their worker.
    #[must_use]
    pub const fn pending_connects(&self) -> &PendingConnects {
        &self.connects
    }

    /// Parses `locator` with this agent's identity defaults.
    ///
    /// # Errors
    ///
    /// Returns [`LocatorError`] for malformed property segments.
    pub fn parse_locator(&self, locator: &str) -> Result<PeerDescriptor, LocatorError> {
        parse_locator_with(locator, &self.identity)
    }

    /// Returns `true` once shutdown has been requested or triggered.
    #[must_use]
    pub const fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Outcome of a finished shutdown.
    #[must_use]
    pub const fn shutdown_outcome(&self) -> Option<&ShutdownOutcome> {
        self.shutdown_outcome.as_ref()
    }

    /// Runs every shutdown hook once without waiting for the result.
    pub fn trigger_shutdown(&mut self) {
        self.shutting_down = true;
        let mut registry = mem::take(&mut self.shutdown);
        registry.trigger(self);
        self.shutdown = registry;
        self.update_channels_shutdown();
    }

    /// Triggers shutdown and stops the dispatcher once every subsystem has
    /// stopped or the shutdown budget is spent. Later calls do nothing.
    pub fn request_shutdown(&mut self) {
        if self.shutdown_started.is_some() {
            return;
        }
        info!(target: AGENT_TARGET, "shutdown requested");
        self.reporter.shutdown_requested();
        self.shutdown_started = Some(Instant::now());
        self.trigger_shutdown();
        self.poll_shutdown();
    }

    fn poll_shutdown(&mut self) {
        if self.shutdown_outcome.is_some() {
            return;
        }
        let outcome = if self.shutdown.all_stopped() {
            ShutdownOutcome::Clean
        } else if self
            .shutdown_started
            .is_some_and(|started| started.elapsed() >= self.shutdown_timeout)
        {
            ShutdownOutcome::TimedOut {
                outstanding: self.shutdown.outstanding(),
            }
        } else {
            self.poster
                .post_delayed(SHUTDOWN_POLL, |agent: &mut Self| agent.poll_shutdown());
            return;
        };

        match &outcome {
            ShutdownOutcome::Clean => info!(target: AGENT_TARGET, "shutdown complete"),
            ShutdownOutcome::TimedOut { outstanding } => warn!(
                target: AGENT_TARGET,
                outstanding = ?outstanding,
                "shutdown timed out"
            ),
        }
        self.reporter
            .shutdown_completed(outcome == ShutdownOutcome::Clean);
        self.shutdown_outcome = Some(outcome);
        self.poster.cancel();
    }

    /// Closes every channel and server.
    pub fn close_all(&mut self) {
        for id in self.channels.ids() {
            self.close_channel(id);
        }
        for id in self.servers.ids() {
            self.shut_server(id);
        }
        self.update_channels_shutdown();
    }

    /// Marks the channel subsystem stopped once shutdown is pending and no
    /// channel, server or connect remains.
    pub(crate) fn update_channels_shutdown(&mut self) {
        if !self.channels_tracker.is_pending() {
            return;
        }
        if self.channels.is_empty() && self.servers.is_empty() && self.connects.is_empty() {
            debug!(target: AGENT_TARGET, "channel subsystem stopped");
            self.channels_tracker.set_stopped();
        }
    }
}
