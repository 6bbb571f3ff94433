//! BDD test world: an agent, a broadcast group and mock channels for step functions.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tether_config::ExecutorSettings;

use crate::agent::Agent;
use crate::channel::{ChannelError, ChannelEvent, ChannelId, ChannelState, GroupId};
use crate::dispatcher::Dispatcher;

use super::dispatch::test_agent;
use super::reporter::RecordingHealthReporter;
use super::transport::{MockTransport, RecordingProtocol, TransportLog};

/// Scenario world shared across channel lifecycle steps.
pub struct TestWorld {
    pub dispatcher: Dispatcher<Agent>,
    pub agent: Agent,
    pub reporter: Arc<RecordingHealthReporter>,
    pub protocol: Rc<RecordingProtocol>,
    pub group: Option<GroupId>,
    pub channels: Vec<ChannelId>,
    pub logs: Vec<Rc<RefCell<TransportLog>>>,
    pub closed: Rc<RefCell<Vec<ChannelId>>>,
    pub opened: Rc<RefCell<Vec<ChannelId>>>,
    pub delivered: Option<usize>,
    pub last_error: Option<ChannelError>,
}

impl TestWorld {
    /// Builds a world with an idle agent and listeners recording opens and
    /// closes.
    #[must_use]
    pub fn new() -> Self {
        let (dispatcher, mut agent, reporter) = test_agent(ExecutorSettings::default());
        let closed = Rc::new(RefCell::new(Vec::new()));
        let opened = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&closed);
        agent.add_channel_listener(ChannelEvent::Closed, move |_, id| {
            sink.borrow_mut().push(id);
        });
        let sink = Rc::clone(&opened);
        agent.add_channel_listener(ChannelEvent::Opened, move |_, id| {
            sink.borrow_mut().push(id);
        });
        Self {
            dispatcher,
            agent,
            reporter,
            protocol: Rc::new(RecordingProtocol::default()),
            group: None,
            channels: Vec::new(),
            logs: Vec::new(),
            closed,
            opened,
            delivered: None,
            last_error: None,
        }
    }

    /// Creates `count` mock channels with the recording protocol attached,
    /// joining the world's group when one exists.
    pub fn add_channels(&mut self, count: usize) -> Result<(), ChannelError> {
        for index in 0..count {
            let (transport, log) = MockTransport::new();
            let id = self
                .agent
                .create_channel(format!("mock-{index}"), Box::new(transport));
            self.agent.set_protocol(id, self.protocol.clone())?;
            if let Some(group) = self.group {
                self.agent.set_group(id, group)?;
            }
            self.channels.push(id);
            self.logs.push(log);
        }
        Ok(())
    }

    /// Handle of the channel at `index`.
    pub fn channel(&self, index: usize) -> Result<ChannelId, String> {
        self.channels
            .get(index)
            .copied()
            .ok_or_else(|| format!("no channel at index {index}"))
    }

    /// Transport log of the channel at `index`.
    pub fn log(&self, index: usize) -> Result<Rc<RefCell<TransportLog>>, String> {
        self.logs
            .get(index)
            .cloned()
            .ok_or_else(|| format!("no transport log at index {index}"))
    }

    /// Moves the channel at `index` through the handshake.
    pub fn connect(&mut self, index: usize) -> Result<(), String> {
        let id = self.channel(index)?;
        self.agent
            .set_channel_state(id, ChannelState::Connected)
            .map_err(|error| error.to_string())
    }

    /// Current state of the channel at `index`, if it still exists.
    pub fn state(&self, index: usize) -> Result<Option<ChannelState>, String> {
        let id = self.channel(index)?;
        Ok(self.agent.channel(id).map(|channel| channel.state()))
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
