//! Transport core of the Tether debugging agent.
//!
//! The agent serves remote debugger connections. Everything that touches
//! channel state runs on one dispatcher thread as posted callbacks against
//! the [`Agent`] context; blocking system calls run on a bounded pool of
//! worker threads and report back through the same dispatcher.
//!
//! ## Components
//!
//! - [`dispatcher`]: the single-threaded event loop and its thread-safe
//!   [`Poster`](dispatcher::Poster).
//! - [`asyncreq`]: the request [`Executor`](asyncreq::Executor), capped at
//!   32 workers by default, which runs one blocking call per request.
//! - [`channel`]: the channel state machine, listener lists and broadcast
//!   groups.
//! - [`transport`]: TCP and UNIX stream servers and client connects.
//! - [`peer`]: locator parsing and the peer property bag.
//! - [`shutdown`]: the hook registry that holds process exit until workers
//!   have drained and channels have closed.
//!
//! The binary wires these together in [`run_agent`]: a server per listen
//! locator, a shared broadcast group for accepted channels, an optional idle
//! timeout and signal-driven shutdown with a ten second budget.

mod agent;
pub mod asyncreq;
mod bootstrap;
pub mod channel;
pub mod dispatcher;
mod health;
pub mod peer;
mod process;
pub mod shutdown;
mod telemetry;
pub mod transport;

pub use agent::{Agent, DEFAULT_SHUTDOWN_TIMEOUT, ShutdownOutcome};
pub use bootstrap::{
    Bootstrap, BootstrapError, ConfigLoader, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    IdleMonitor, LaunchError, LaunchPlan, RelayProtocol, ShutdownError, ShutdownSignal,
    SystemShutdownSignal, run_agent, run_agent_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
