//! Protocol handles attached to channels.

use super::ChannelId;
use crate::agent::Agent;

/// Consumer of the bytes a channel receives.
///
/// The channel layer never inspects a protocol; it only holds a shared
/// reference and forwards input and lifecycle notifications on the
/// dispatcher thread.
pub trait Protocol {
    /// Handles bytes received on `channel`.
    fn receive(&self, agent: &mut Agent, channel: ChannelId, bytes: &[u8]);

    /// Called when `channel` completes its handshake.
    fn opened(&self, _agent: &mut Agent, _channel: ChannelId) {}

    /// Called after `channel` has been closed.
    fn closed(&self, _agent: &mut Agent, _channel: ChannelId) {}
}
