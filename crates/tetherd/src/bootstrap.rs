//! Agent bootstrap orchestration.

use std::sync::Arc;

use thiserror::Error;

use tether_config::{Config, ConfigError};

use crate::health::HealthReporter;
use crate::peer::{HostIdentity, LocatorError, PeerDescriptor, parse_locator_with};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the agent configuration.
    ///
    /// # Errors
    ///
    /// Returns the parse or validation failure.
    fn load(&self) -> Result<Config, ConfigError>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::load()
    }
}

/// Loader that hands out a configuration resolved elsewhere.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// A listen locator did not parse.
    #[error("invalid listen locator: {source}")]
    Locator {
        /// Underlying parse error.
        #[source]
        source: LocatorError,
    },
}

impl BootstrapError {
    /// The clap error behind a `--help`, `--version` or usage failure.
    #[must_use]
    pub fn cli_error(&self) -> Option<&clap::Error> {
        match self {
            Self::Configuration {
                source: ConfigError::Cli(error),
            } => Some(error),
            _ => None,
        }
    }
}

/// Result of a successful bootstrap invocation.
#[derive(Debug)]
pub struct Bootstrap {
    config: Config,
    identity: HostIdentity,
    endpoints: Vec<PeerDescriptor>,
    telemetry: TelemetryHandle,
}

impl Bootstrap {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Identity advertised by every server the agent opens.
    #[must_use]
    pub fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    /// Parsed listen locators, in configuration order.
    #[must_use]
    pub fn endpoints(&self) -> &[PeerDescriptor] {
        &self.endpoints
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Splits the bootstrap result into its owned parts.
    #[must_use]
    pub fn into_parts(self) -> (Config, HostIdentity, Vec<PeerDescriptor>) {
        (self.config, self.identity, self.endpoints)
    }
}

/// Bootstraps the agent using the supplied collaborators.
///
/// Loads configuration, installs telemetry and parses every listen locator
/// so a malformed one fails before any socket is opened.
///
/// # Errors
///
/// Returns the first failing stage; the reporter sees the same error.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: &Arc<dyn HealthReporter>,
) -> Result<Bootstrap, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config.log_settings()) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let identity = HostIdentity::named(config.server_name());
    let endpoints = match parse_endpoints(config.listen(), &identity) {
        Ok(endpoints) => endpoints,
        Err(source) => {
            let error = BootstrapError::Locator { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    reporter.bootstrap_succeeded(&config);
    Ok(Bootstrap {
        config,
        identity,
        endpoints,
        telemetry,
    })
}

fn parse_endpoints(
    locators: &[String],
    identity: &HostIdentity,
) -> Result<Vec<PeerDescriptor>, LocatorError> {
    locators
        .iter()
        .map(|locator| locator.trim())
        .filter(|locator| !locator.is_empty())
        .map(|locator| parse_locator_with(locator, identity))
        .collect()
}
