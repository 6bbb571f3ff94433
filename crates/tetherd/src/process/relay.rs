//! Built-in protocol relaying channel input to a broadcast group.

use tracing::{debug, warn};

use super::PROCESS_TARGET;
use crate::agent::Agent;
use crate::channel::{ChannelId, ChannelState, GroupId, Protocol};

/// Protocol attached to every channel the agent accepts.
///
/// A channel's first input completes its handshake, moving it from
/// `Started` to `Connected`. Every input block, the first included, is then
/// written to the shared group, so each connected peer sees the traffic of
/// all peers, its own included.
#[derive(Debug, Clone, Copy)]
pub struct RelayProtocol {
    group: GroupId,
}

impl RelayProtocol {
    /// Relays into `group`.
    #[must_use]
    pub const fn new(group: GroupId) -> Self {
        Self { group }
    }

    /// Group receiving relayed input.
    #[must_use]
    pub const fn group(&self) -> GroupId {
        self.group
    }
}

impl Protocol for RelayProtocol {
    fn receive(&self, agent: &mut Agent, channel: ChannelId, bytes: &[u8]) {
        let started = agent
            .channel(channel)
            .is_some_and(|channel| channel.state() == ChannelState::Started);
        if started && let Err(error) = agent.set_channel_state(channel, ChannelState::Connected) {
            warn!(
                target: PROCESS_TARGET,
                channel = %channel,
                error = %error,
                "handshake transition rejected"
            );
        }
        match agent.group_write_block(self.group, bytes) {
            Ok(delivered) => debug!(
                target: PROCESS_TARGET,
                channel = %channel,
                len = bytes.len(),
                delivered,
                "input relayed"
            ),
            Err(error) => warn!(
                target: PROCESS_TARGET,
                channel = %channel,
                error = %error,
                "relay failed"
            ),
        }
    }

    fn opened(&self, _agent: &mut Agent, channel: ChannelId) {
        debug!(
            target: PROCESS_TARGET,
            channel = %channel,
            group = %self.group,
            "relay peer joined"
        );
    }
}
