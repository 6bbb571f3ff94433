//! Test harness utilities shared by the agent suites.

mod config_loader;
mod dispatch;
mod reporter;
mod signal;
mod transport;
mod world;

pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use dispatch::{WAIT_TIMEOUT, pump_until, run_until, test_agent};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use signal::{ManualShutdownSignal, SignalTrigger};
pub use transport::{MockTransport, RecordingProtocol, TransportLog};
pub use world::{TestWorld, world};
