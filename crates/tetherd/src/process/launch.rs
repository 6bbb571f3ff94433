//! Supervises agent launch sequencing and runtime orchestration.

use std::io::{self, Write};
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::StructuredHealthReporter;
use crate::agent::{Agent, ShutdownOutcome};
use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::channel::{ChannelError, ChannelId, GroupId, Protocol};
use crate::dispatcher::{Dispatcher, Poster};
use crate::health::HealthReporter;
use crate::peer::PeerDescriptor;
use crate::transport::ServerId;

use super::errors::LaunchError;
use super::idle::IdleMonitor;
use super::relay::RelayProtocol;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::{PROCESS_TARGET, SHUTDOWN_TIMEOUT};

/// Collaborators required to launch the agent runtime.
pub struct LaunchPlan<L, S, W> {
    /// Source of the configuration.
    pub loader: L,
    /// Sink for lifecycle events.
    pub reporter: Arc<dyn HealthReporter>,
    /// Blocks until the agent should shut down.
    pub signal: S,
    /// Receives the `Server-Properties` line.
    pub output: W,
}

/// Runs the agent using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when startup fails or shutdown times out.
pub fn run_agent() -> Result<(), LaunchError> {
    let signal = SystemShutdownSignal::install()?;
    run_agent_with(LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        signal,
        output: io::stdout(),
    })
}

/// Runs the agent with injected collaborators until shutdown completes.
///
/// # Errors
///
/// Returns [`LaunchError`] when startup fails or shutdown times out.
pub fn run_agent_with<L, S, W>(plan: LaunchPlan<L, S, W>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
    W: Write,
{
    let LaunchPlan {
        loader,
        reporter,
        signal,
        mut output,
    } = plan;

    let bootstrap = bootstrap_with(&loader, &reporter)?;
    let (config, identity, endpoints) = bootstrap.into_parts();
    info!(
        target: PROCESS_TARGET,
        endpoints = endpoints.len(),
        "starting agent runtime"
    );

    let dispatcher = Dispatcher::new();
    let mut agent = Agent::new(
        dispatcher.poster(),
        config.executor(),
        identity,
        Arc::clone(&reporter),
    )
    .with_shutdown_timeout(SHUTDOWN_TIMEOUT);

    let servers = match open_servers(&mut agent, endpoints) {
        Ok(servers) => servers,
        Err(error) => return Err(abandon_launch(&dispatcher, &mut agent, error)),
    };
    if config.print_server_properties
        && let Some(server) = servers.first().and_then(|id| agent.server(*id))
        && let Err(source) = print_properties(&mut output, server.peer())
    {
        let error = LaunchError::Output { source };
        return Err(abandon_launch(&dispatcher, &mut agent, error));
    }
    if let Some(seconds) = config.idle_timeout {
        IdleMonitor::install(&mut agent, Duration::from_secs(seconds));
    }
    if let Err(error) = spawn_signal_watcher(signal, dispatcher.poster()) {
        return Err(abandon_launch(&dispatcher, &mut agent, error));
    }

    dispatcher.run(&mut agent);

    match agent.shutdown_outcome() {
        Some(ShutdownOutcome::TimedOut { outstanding }) => Err(LaunchError::ShutdownTimeout {
            outstanding: outstanding.join(", "),
        }),
        _ => {
            info!(target: PROCESS_TARGET, "shutdown sequence completed");
            Ok(())
        }
    }
}

/// Shuts down whatever startup already opened and hands back `error`.
///
/// Pending accepts must return before their servers release the listening
/// socket, so the dispatcher runs until shutdown resolves.
fn abandon_launch(
    dispatcher: &Dispatcher<Agent>,
    agent: &mut Agent,
    error: LaunchError,
) -> LaunchError {
    warn!(target: PROCESS_TARGET, error = %error, "agent launch failed");
    agent.request_shutdown();
    dispatcher.run(agent);
    error
}

/// Starts one server per endpoint. Accepted channels share one relay
/// protocol and one broadcast group, and are started immediately.
fn open_servers(
    agent: &mut Agent,
    endpoints: Vec<PeerDescriptor>,
) -> Result<Vec<ServerId>, LaunchError> {
    let group = agent.alloc_group();
    let protocol: Rc<dyn Protocol> = Rc::new(RelayProtocol::new(group));
    let mut servers = Vec::with_capacity(endpoints.len());
    for peer in endpoints {
        let locator = peer.to_json();
        let protocol = Rc::clone(&protocol);
        let id = agent
            .start_server(peer, move |agent: &mut Agent, channel| {
                accept_channel(agent, channel, &protocol, group);
            })
            .map_err(|source| LaunchError::Server { locator, source })?;
        servers.push(id);
    }
    Ok(servers)
}

fn accept_channel(
    agent: &mut Agent,
    channel: ChannelId,
    protocol: &Rc<dyn Protocol>,
    group: GroupId,
) {
    if let Err(error) = attach(agent, channel, protocol, group) {
        warn!(
            target: PROCESS_TARGET,
            channel = %channel,
            error = %error,
            "failed to start accepted channel"
        );
        agent.close_channel(channel);
    }
}

fn attach(
    agent: &mut Agent,
    channel: ChannelId,
    protocol: &Rc<dyn Protocol>,
    group: GroupId,
) -> Result<(), ChannelError> {
    agent.set_protocol(channel, Rc::clone(protocol))?;
    agent.set_group(channel, group)?;
    agent.start_channel(channel)
}

fn print_properties<W: Write>(output: &mut W, peer: &PeerDescriptor) -> io::Result<()> {
    writeln!(output, "Server-Properties: {}", peer.to_json())?;
    output.flush()
}

fn spawn_signal_watcher<S>(mut signal: S, poster: Poster<Agent>) -> Result<(), LaunchError>
where
    S: ShutdownSignal,
{
    thread::Builder::new()
        .name("tether-signals".to_owned())
        .spawn(move || {
            signal.wait();
            poster.post(Agent::request_shutdown);
        })
        .map(drop)
        .map_err(|source| LaunchError::SignalThread { source })
}
