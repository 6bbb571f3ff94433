//! Defines the unified error surface for agent launch and supervision.

use std::io;

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::channel::ChannelError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the agent process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the agent failed.
    #[error("agent bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// A configured channel server could not be started.
    #[error("failed to start channel server for `{locator}`: {source}")]
    Server {
        /// Serialized properties of the endpoint.
        locator: String,
        /// Underlying channel error.
        #[source]
        source: ChannelError,
    },
    /// Installing signal handlers failed.
    #[error("failed to install shutdown signals: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// Spawning the signal watcher thread failed.
    #[error("failed to spawn signal watcher: {source}")]
    SignalThread {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the server properties to stdout failed.
    #[error("failed to print server properties: {source}")]
    Output {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Shutdown gave up before every subsystem stopped.
    #[error("shutdown timed out waiting for: {outstanding}")]
    ShutdownTimeout {
        /// Comma-separated names of subsystems still running.
        outstanding: String,
    },
}

impl LaunchError {
    /// The clap error behind a `--help`, `--version` or usage failure.
    #[must_use]
    pub fn cli_error(&self) -> Option<&clap::Error> {
        match self {
            Self::Bootstrap { source } => source.cli_error(),
            _ => None,
        }
    }
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
