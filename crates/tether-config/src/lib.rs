//! Configuration shared by the Tether agent binary and its tests.
//!
//! Settings come from command-line flags with environment variable fallbacks.
//! Listen endpoints are kept as raw locator strings; the agent parses them with
//! its peer locator so that malformed entries are reported at the point where a
//! channel server would have been created.

mod defaults;
mod executor;
mod logging;

use std::ffi::OsString;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_LOCATOR, DEFAULT_LOG_FILTER, DEFAULT_MAX_IDLE_WORKERS, DEFAULT_MAX_WORKERS,
    DEFAULT_SERVER_NAME, DEFAULT_TCP_PORT, default_listen, default_log_filter, default_log_format,
};
pub use executor::ExecutorSettings;
pub use logging::{LogFormat, LogFormatParseError, LogSettings};

/// Resolved agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Parser, Serialize, Deserialize)]
#[command(
    name = "tetherd",
    about = "Remote debugging agent transport",
    version
)]
pub struct Config {
    /// Listen locators, e.g. `TCP::1534` or `UNIX:/run/tether.sock`.
    #[arg(
        short = 's',
        long = "listen",
        env = "TETHER_LISTEN",
        default_values_t = default_listen()
    )]
    pub listen: Vec<String>,

    /// Tracing filter directive.
    #[arg(long, env = "TETHER_LOG_FILTER", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,

    /// Log output format (`json` or `compact`).
    #[arg(long, env = "TETHER_LOG_FORMAT", default_value_t = default_log_format())]
    pub log_format: LogFormat,

    /// Maximum number of executor worker threads.
    #[arg(long, env = "TETHER_MAX_WORKERS", default_value_t = DEFAULT_MAX_WORKERS)]
    pub max_workers: usize,

    /// Maximum number of parked executor worker threads.
    #[arg(long, env = "TETHER_MAX_IDLE_WORKERS", default_value_t = DEFAULT_MAX_IDLE_WORKERS)]
    pub max_idle_workers: usize,

    /// Exit after this many seconds without any open channel.
    #[arg(short = 'I', long, env = "TETHER_IDLE_TIMEOUT")]
    pub idle_timeout: Option<u64>,

    /// Print the first server's properties as JSON on startup.
    #[arg(short = 'S', long)]
    pub print_server_properties: bool,

    /// Name advertised in the peer properties.
    #[arg(long, env = "TETHER_SERVER_NAME", default_value = DEFAULT_SERVER_NAME)]
    pub server_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: default_log_format(),
            max_workers: DEFAULT_MAX_WORKERS,
            max_idle_workers: DEFAULT_MAX_IDLE_WORKERS,
            idle_timeout: None,
            print_server_properties: false,
            server_name: DEFAULT_SERVER_NAME.to_owned(),
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// The first item is treated as the program name.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::try_parse_from(args).map_err(ConfigError::Cli)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field invariants that clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.iter().all(|locator| locator.trim().is_empty()) {
            return Err(ConfigError::NoListenLocator);
        }
        if self.max_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.max_idle_workers > self.max_workers {
            return Err(ConfigError::IdleExceedsWorkers {
                idle: self.max_idle_workers,
                workers: self.max_workers,
            });
        }
        Ok(())
    }

    /// Listen locators in configuration order.
    #[must_use]
    pub fn listen(&self) -> &[String] {
        &self.listen
    }

    /// Tracing filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Filter and format bundled for telemetry.
    #[must_use]
    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            filter: self.log_filter.clone(),
            format: self.log_format,
        }
    }

    /// Executor sizing derived from the worker flags.
    #[must_use]
    pub fn executor(&self) -> ExecutorSettings {
        ExecutorSettings::new(self.max_workers, self.max_idle_workers)
    }

    /// Name advertised in the `Name` peer property.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command-line or environment parsing failed (also used for `--help`).
    #[error(transparent)]
    Cli(clap::Error),
    /// Every listen locator was blank.
    #[error("at least one listen locator is required")]
    NoListenLocator,
    /// The worker cap was zero.
    #[error("max_workers must be at least 1")]
    ZeroWorkers,
    /// More idle workers than workers were requested.
    #[error("max_idle_workers ({idle}) exceeds max_workers ({workers})")]
    IdleExceedsWorkers {
        /// Requested idle cap.
        idle: usize,
        /// Requested worker cap.
        workers: usize,
    },
}
