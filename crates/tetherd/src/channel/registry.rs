//! Arena of live channels and broadcast groups.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::link::ChannelTransport;
use super::{ChannelId, ChannelState, GroupId, Protocol};
use crate::asyncreq::OsError;

/// A bidirectional connection over a pluggable transport.
pub struct Channel {
    pub(super) id: ChannelId,
    pub(super) peer_name: String,
    pub(super) state: ChannelState,
    pub(super) protocol: Option<Rc<dyn Protocol>>,
    pub(super) group: Option<GroupId>,
    pub(super) locks: usize,
    pub(super) transport: Box<dyn ChannelTransport>,
    pub(super) error: Option<OsError>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("peer_name", &self.peer_name)
            .field("state", &self.state)
            .field("transport", &self.transport.name())
            .field("group", &self.group)
            .field("locks", &self.locks)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Handle of this channel.
    #[must_use]
    pub const fn id(&self) -> ChannelId {
        self.id
    }

    /// Human-readable name of the remote end.
    #[must_use]
    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ChannelState {
        self.state
    }

    /// Returns `true` once the channel has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == ChannelState::Closed
    }

    /// Name of the owning transport.
    #[must_use]
    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Broadcast group the channel belongs to.
    #[must_use]
    pub const fn group(&self) -> Option<GroupId> {
        self.group
    }

    /// Outstanding locks deferring destruction.
    #[must_use]
    pub const fn locks(&self) -> usize {
        self.locks
    }

    /// Attached protocol handle.
    #[must_use]
    pub fn protocol(&self) -> Option<&Rc<dyn Protocol>> {
        self.protocol.as_ref()
    }

    /// OS error that ended the connection, if any.
    #[must_use]
    pub const fn error(&self) -> Option<OsError> {
        self.error
    }
}

/// Fan-out target over a set of member channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastGroup {
    pub(super) members: Vec<ChannelId>,
}

impl BroadcastGroup {
    /// Member channels in join order.
    #[must_use]
    pub fn members(&self) -> &[ChannelId] {
        &self.members
    }
}

/// Dispatcher-owned storage for channels and broadcast groups.
///
/// Handles are never reused, so a handle to a destroyed channel or freed
/// group simply stops resolving.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: BTreeMap<ChannelId, Channel>,
    groups: BTreeMap<GroupId, BroadcastGroup>,
    next_channel: u64,
    next_group: u64,
}

impl ChannelRegistry {
    pub(super) fn insert(
        &mut self,
        peer_name: String,
        transport: Box<dyn ChannelTransport>,
    ) -> ChannelId {
        self.next_channel += 1;
        let id = ChannelId(self.next_channel);
        self.channels.insert(
            id,
            Channel {
                id,
                peer_name,
                state: ChannelState::StartWait,
                protocol: None,
                group: None,
                locks: 0,
                transport,
                error: None,
            },
        );
        id
    }

    /// Looks up a live channel.
    #[must_use]
    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub(super) fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(&id)
    }

    /// Removes a channel and unlinks it from its group.
    pub(super) fn remove(&mut self, id: ChannelId) -> Option<Channel> {
        let channel = self.channels.remove(&id)?;
        if let Some(group) = channel.group.and_then(|group| self.groups.get_mut(&group)) {
            group.members.retain(|member| *member != id);
        }
        Some(channel)
    }

    /// Handles of live channels in creation order.
    #[must_use]
    pub fn ids(&self) -> Vec<ChannelId> {
        self.channels.keys().copied().collect()
    }

    /// Live channels in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Number of live channels, including closed ones still locked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` when no channels are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of channels not yet closed.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.channels
            .values()
            .filter(|channel| !channel.is_closed())
            .count()
    }

    pub(super) fn alloc_group(&mut self) -> GroupId {
        self.next_group += 1;
        let id = GroupId(self.next_group);
        self.groups.insert(id, BroadcastGroup::default());
        id
    }

    /// Looks up a live broadcast group.
    #[must_use]
    pub fn group(&self, id: GroupId) -> Option<&BroadcastGroup> {
        self.groups.get(&id)
    }

    pub(super) fn group_mut(&mut self, id: GroupId) -> Option<&mut BroadcastGroup> {
        self.groups.get_mut(&id)
    }

    pub(super) fn remove_group(&mut self, id: GroupId) -> Option<BroadcastGroup> {
        self.groups.remove(&id)
    }
}
