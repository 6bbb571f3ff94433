//! Agent process launch: servers, signals, idle timeout and shutdown.

use std::time::Duration;

mod errors;
mod idle;
pub(crate) mod launch;
mod relay;
pub(crate) mod shutdown;

pub use errors::LaunchError;
pub use idle::IdleMonitor;
pub use launch::{LaunchPlan, run_agent, run_agent_with};
pub use relay::RelayProtocol;
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
pub(crate) const SHUTDOWN_TIMEOUT: Duration = crate::agent::DEFAULT_SHUTDOWN_TIMEOUT;
