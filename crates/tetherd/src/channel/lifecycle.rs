//! Channel lifecycle operations on the agent context.

use std::rc::Rc;

use tracing::{debug, info, trace, warn};

use super::link::{ChannelLink, ChannelTransport, TransportEvent};
use super::{CHANNEL_TARGET, Channel, ChannelError, ChannelEvent, ChannelId, ChannelState, Protocol};
use crate::agent::Agent;
use crate::asyncreq::AsyncRequest;

impl Agent {
    /// Registers a channel in [`ChannelState::StartWait`] and notifies the
    /// create listeners.
    pub fn create_channel(
        &mut self,
        peer_name: impl Into<String>,
        transport: Box<dyn ChannelTransport>,
    ) -> ChannelId {
        let peer_name = peer_name.into();
        let transport_name = transport.name().to_owned();
        let id = self.channels.insert(peer_name.clone(), transport);
        debug!(
            target: CHANNEL_TARGET,
            channel = %id,
            peer = %peer_name,
            transport = %transport_name,
            "channel created"
        );
        self.reporter.channel_created(id, &peer_name);
        self.notify_listeners(ChannelEvent::Created, id);
        id
    }

    /// Looks up a live channel.
    #[must_use]
    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id)
    }

    /// Moves a channel from `StartWait` to `Started` and starts its transport.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidState`] unless the channel is in
    /// `StartWait`. If the transport cannot start, the channel is closed and
    /// the transport error returned.
    pub fn start_channel(&mut self, id: ChannelId) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get_mut(id)
            .ok_or(ChannelError::UnknownChannel(id))?;
        if channel.state != ChannelState::StartWait {
            return Err(ChannelError::InvalidState {
                channel: id,
                state: channel.state,
                operation: "start",
            });
        }
        channel.state = ChannelState::Started;
        let mut link = ChannelLink::new(id, &mut channel.locks, &self.executor);
        if let Err(error) = channel.transport.start(&mut link) {
            warn!(
                target: CHANNEL_TARGET,
                channel = %id,
                error = %error,
                "transport failed to start"
            );
            self.close_channel(id);
            return Err(error.into());
        }
        trace!(target: CHANNEL_TARGET, channel = %id, "channel started");
        Ok(())
    }

    /// Applies a handshake or redirect transition.
    ///
    /// Entering `Connected` from `Started` notifies the protocol and the open
    /// listeners.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidState`] when the transition is not
    /// allowed from the current state.
    pub fn set_channel_state(
        &mut self,
        id: ChannelId,
        next: ChannelState,
    ) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get_mut(id)
            .ok_or(ChannelError::UnknownChannel(id))?;
        let previous = channel.state;
        if !previous.can_enter(next) {
            return Err(ChannelError::InvalidState {
                channel: id,
                state: previous,
                operation: "transition",
            });
        }
        channel.state = next;
        trace!(
            target: CHANNEL_TARGET,
            channel = %id,
            from = %previous,
            to = %next,
            "channel state changed"
        );
        if previous == ChannelState::Started && next == ChannelState::Connected {
            let peer = channel.peer_name.clone();
            let protocol = channel.protocol.clone();
            info!(target: CHANNEL_TARGET, channel = %id, peer = %peer, "channel opened");
            self.reporter.channel_opened(id, &peer);
            if let Some(protocol) = protocol {
                protocol.opened(self, id);
            }
            self.notify_listeners(ChannelEvent::Opened, id);
        }
        Ok(())
    }

    /// Closes a channel. Closing an already closed or destroyed channel does
    /// nothing.
    ///
    /// The transport teardown hook runs exactly once. The channel is
    /// destroyed as soon as no locks remain.
    pub fn close_channel(&mut self, id: ChannelId) {
        let Some(channel) = self.channels.get_mut(id) else {
            return;
        };
        if channel.state == ChannelState::Closed {
            return;
        }
        channel.state = ChannelState::Closed;
        let mut link = ChannelLink::new(id, &mut channel.locks, &self.executor);
        channel.transport.close(&mut link);
        let peer = channel.peer_name.clone();
        let protocol = channel.protocol.clone();
        let error = channel.error;

        info!(
            target: CHANNEL_TARGET,
            channel = %id,
            peer = %peer,
            error = ?error,
            "channel closed"
        );
        self.reporter.channel_closed(id, &peer);
        if let Some(protocol) = protocol {
            protocol.closed(self, id);
        }
        self.notify_listeners(ChannelEvent::Closed, id);
        self.release_channel(id);
    }

    /// Returns `true` when the channel is closed or no longer exists.
    #[must_use]
    pub fn is_channel_closed(&self, id: ChannelId) -> bool {
        self.channels.get(id).is_none_or(Channel::is_closed)
    }

    /// Defers destruction of a channel until the matching
    /// [`unlock_channel`](Self::unlock_channel).
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UnknownChannel`] for stale handles.
    pub fn lock_channel(&mut self, id: ChannelId) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get_mut(id)
            .ok_or(ChannelError::UnknownChannel(id))?;
        channel.locks += 1;
        Ok(())
    }

    /// Releases a lock taken with [`lock_channel`](Self::lock_channel),
    /// destroying the channel if it is closed and this was the last lock.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidState`] when the channel holds no locks.
    pub fn unlock_channel(&mut self, id: ChannelId) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get_mut(id)
            .ok_or(ChannelError::UnknownChannel(id))?;
        if channel.locks == 0 {
            return Err(ChannelError::InvalidState {
                channel: id,
                state: channel.state,
                operation: "unlock",
            });
        }
        channel.locks -= 1;
        self.release_channel(id);
        Ok(())
    }

    /// Attaches the protocol handle that receives the channel's input.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UnknownChannel`] for stale handles.
    pub fn set_protocol(
        &mut self,
        id: ChannelId,
        protocol: Rc<dyn Protocol>,
    ) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get_mut(id)
            .ok_or(ChannelError::UnknownChannel(id))?;
        channel.protocol = Some(protocol);
        Ok(())
    }

    /// Writes `bytes` to one channel.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] for closed channels, or the executor
    /// error if the transport could not queue the send; in that case the
    /// channel is closed.
    pub fn write_block(&mut self, id: ChannelId, bytes: &[u8]) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get_mut(id)
            .ok_or(ChannelError::UnknownChannel(id))?;
        if channel.is_closed() {
            return Err(ChannelError::Closed(id));
        }
        let mut link = ChannelLink::new(id, &mut channel.locks, &self.executor);
        if let Err(error) = channel.transport.write_block(&mut link, bytes) {
            self.close_channel(id);
            return Err(error.into());
        }
        Ok(())
    }

    /// Writes a single byte to one channel.
    ///
    /// # Errors
    ///
    /// As for [`write_block`](Self::write_block).
    pub fn write_byte(&mut self, id: ChannelId, byte: u8) -> Result<(), ChannelError> {
        self.write_block(id, &[byte])
    }

    /// Routes a completed transport request back to its channel.
    pub(crate) fn transport_completed(&mut self, id: ChannelId, request: AsyncRequest) {
        let Some(channel) = self.channels.get_mut(id) else {
            warn!(
                target: CHANNEL_TARGET,
                channel = %id,
                kind = %request.kind(),
                "completion for destroyed channel dropped"
            );
            return;
        };
        channel.locks = channel.locks.saturating_sub(1);
        let mut link = ChannelLink::new(id, &mut channel.locks, &self.executor);
        let event = channel.transport.complete(&mut link, request);
        let protocol = channel.protocol.clone();
        let closed = channel.is_closed();

        match event {
            TransportEvent::Idle => {}
            TransportEvent::Received(bytes) if !closed => match protocol {
                Some(protocol) => protocol.receive(self, id, &bytes),
                None => trace!(
                    target: CHANNEL_TARGET,
                    channel = %id,
                    len = bytes.len(),
                    "input dropped; no protocol attached"
                ),
            },
            TransportEvent::Received(_) => {}
            TransportEvent::Disconnected(error) => {
                if let Some(channel) = self.channels.get_mut(id)
                    && channel.error.is_none()
                {
                    channel.error = error;
                }
                debug!(
                    target: CHANNEL_TARGET,
                    channel = %id,
                    error = ?error,
                    "transport disconnected"
                );
                self.close_channel(id);
            }
        }
        self.release_channel(id);
    }

    /// Destroys a closed channel once its last lock is gone.
    fn release_channel(&mut self, id: ChannelId) {
        let destroy = self
            .channels
            .get(id)
            .is_some_and(|channel| channel.is_closed() && channel.locks == 0);
        if !destroy {
            return;
        }
        if self.channels.remove(id).is_some() {
            debug!(target: CHANNEL_TARGET, channel = %id, "channel destroyed");
        }
        self.update_channels_shutdown();
    }
}
