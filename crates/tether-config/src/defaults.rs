use crate::logging::LogFormat;

/// Locator used when no listen endpoint is configured.
pub const DEFAULT_LOCATOR: &str = "TCP:";

/// Port a TCP channel server binds when the locator omits one.
pub const DEFAULT_TCP_PORT: u16 = 1534;

/// Value advertised in the `Name` peer property.
pub const DEFAULT_SERVER_NAME: &str = "Tether Agent";

/// Upper bound on concurrently running executor workers.
pub const DEFAULT_MAX_WORKERS: usize = 32;

/// Upper bound on workers parked waiting for new requests.
pub const DEFAULT_MAX_IDLE_WORKERS: usize = 32;

/// Default log filter expression used by the agent.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Returns [`DEFAULT_LOG_FILTER`].
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the agent.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Listen locators used when none are supplied.
#[must_use]
pub fn default_listen() -> Vec<String> {
    vec![DEFAULT_LOCATOR.to_owned()]
}
