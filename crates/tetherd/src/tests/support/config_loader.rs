//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;

use tether_config::{Config, ConfigError};

use crate::bootstrap::ConfigLoader;

/// Loader that listens on an ephemeral loopback TCP port.
#[derive(Debug, Clone)]
pub struct TestConfigLoader {
    config: Config,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::listening(&["TCP:127.0.0.1:0"])
    }

    /// Loader whose configuration listens on `locators`.
    #[must_use]
    pub fn listening(locators: &[&str]) -> Self {
        Self {
            config: Config {
                listen: locators.iter().map(|locator| (*locator).to_owned()).collect(),
                log_filter: "off".to_owned(),
                ..Config::default()
            },
        }
    }

    /// Exits after `seconds` without an open channel.
    #[must_use]
    pub const fn with_idle_timeout(mut self, seconds: u64) -> Self {
        self.config.idle_timeout = Some(seconds);
        self
    }

    /// Prints the first server's properties on startup.
    #[must_use]
    pub const fn printing_properties(mut self) -> Self {
        self.config.print_server_properties = true;
        self
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config.clone())
    }
}

/// Loader that intentionally fails by passing invalid CLI arguments.
#[derive(Debug, Clone, Copy)]
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        let args = vec![
            OsString::from("tetherd"),
            OsString::from("--max-workers"),
            OsString::from("many"),
        ];
        Config::load_from_iter(args)
    }
}
