//! Broadcast groups: output fan-out over member channels.
//!
//! Only members in a broadcast-eligible state receive output; the rest are
//! skipped silently. Group membership never owns a channel.

use std::os::fd::RawFd;

use tracing::{trace, warn};

use super::link::ChannelLink;
use super::{CHANNEL_TARGET, ChannelError, ChannelId, GroupId};
use crate::agent::Agent;
use crate::asyncreq::{AsyncOp, AsyncRequest, OsError};

/// Largest block a single splice reads from its source descriptor.
pub const SPLICE_BLOCK_SIZE: usize = 0x400;

const SPLICE_FALLBACK_ERROR: OsError = OsError::from_raw(libc::EIO);

impl Agent {
    /// Creates an empty broadcast group.
    pub fn alloc_group(&mut self) -> GroupId {
        let id = self.channels.alloc_group();
        trace!(target: CHANNEL_TARGET, group = %id, "broadcast group allocated");
        id
    }

    /// Evicts every member, without closing it, and releases the group.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UnknownGroup`] for stale handles.
    pub fn free_group(&mut self, group: GroupId) -> Result<(), ChannelError> {
        let freed = self
            .channels
            .remove_group(group)
            .ok_or(ChannelError::UnknownGroup(group))?;
        for member in freed.members() {
            if let Some(channel) = self.channels.get_mut(*member) {
                channel.group = None;
            }
        }
        trace!(
            target: CHANNEL_TARGET,
            group = %group,
            evicted = freed.members().len(),
            "broadcast group freed"
        );
        Ok(())
    }

    /// Moves `channel` into `group`, leaving any group it was in before.
    ///
    /// # Errors
    ///
    /// Returns an error when either handle is stale.
    pub fn set_group(&mut self, channel: ChannelId, group: GroupId) -> Result<(), ChannelError> {
        if self.channels.group(group).is_none() {
            return Err(ChannelError::UnknownGroup(group));
        }
        let member = self
            .channels
            .get_mut(channel)
            .ok_or(ChannelError::UnknownChannel(channel))?;
        let previous = member.group.replace(group);
        if previous == Some(group) {
            return Ok(());
        }
        if let Some(previous) = previous.and_then(|id| self.channels.group_mut(id)) {
            previous.members.retain(|id| *id != channel);
        }
        if let Some(target) = self.channels.group_mut(group) {
            target.members.push(channel);
        }
        Ok(())
    }

    /// Removes `channel` from its group, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UnknownChannel`] for stale handles.
    pub fn clear_group(&mut self, channel: ChannelId) -> Result<(), ChannelError> {
        let member = self
            .channels
            .get_mut(channel)
            .ok_or(ChannelError::UnknownChannel(channel))?;
        if let Some(previous) = member.group.take().and_then(|id| self.channels.group_mut(id)) {
            previous.members.retain(|id| *id != channel);
        }
        Ok(())
    }

    /// Writes one byte to every eligible member. Returns the number of
    /// members written to.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UnknownGroup`] for stale handles.
    pub fn group_write(&mut self, group: GroupId, byte: u8) -> Result<usize, ChannelError> {
        self.group_write_block(group, &[byte])
    }

    /// Writes `bytes` to every eligible member. Returns the number of members
    /// written to.
    ///
    /// Members whose transport refuses the write are closed.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UnknownGroup`] for stale handles.
    pub fn group_write_block(&mut self, group: GroupId, bytes: &[u8]) -> Result<usize, ChannelError> {
        let members = self
            .channels
            .group(group)
            .ok_or(ChannelError::UnknownGroup(group))?
            .members()
            .to_vec();
        let mut delivered = 0;
        let mut failed = Vec::new();
        for id in members {
            let Some(channel) = self.channels.get_mut(id) else {
                continue;
            };
            if !channel.state.is_broadcast_eligible() {
                continue;
            }
            let mut link = ChannelLink::new(id, &mut channel.locks, &self.executor);
            match channel.transport.write_block(&mut link, bytes) {
                Ok(()) => delivered += 1,
                Err(error) => {
                    warn!(
                        target: CHANNEL_TARGET,
                        group = %group,
                        channel = %id,
                        error = %error,
                        "broadcast write failed"
                    );
                    failed.push(id);
                }
            }
        }
        for id in failed {
            self.close_channel(id);
        }
        Ok(delivered)
    }

    /// Reads up to [`SPLICE_BLOCK_SIZE`] bytes from `fd` and broadcasts them
    /// with a single block write. Reads at `offset` when given, otherwise at
    /// the descriptor's current position. Returns the number of bytes read.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UnknownGroup`] for stale handles and
    /// [`ChannelError::Splice`] when the read fails.
    pub fn group_splice(
        &mut self,
        group: GroupId,
        fd: RawFd,
        size: usize,
        offset: Option<u64>,
    ) -> Result<usize, ChannelError> {
        if self.channels.group(group).is_none() {
            return Err(ChannelError::UnknownGroup(group));
        }
        let len = size.min(SPLICE_BLOCK_SIZE);
        let op = match offset {
            Some(offset) => AsyncOp::seek_read(fd, len, offset),
            None => AsyncOp::read(fd, len),
        };
        let mut request = AsyncRequest::new(op);
        request.execute();
        let bytes = request
            .received()
            .ok_or_else(|| ChannelError::Splice {
                source: request.error().unwrap_or(SPLICE_FALLBACK_ERROR),
            })?
            .to_vec();
        if !bytes.is_empty() {
            self.group_write_block(group, &bytes)?;
        }
        Ok(bytes.len())
    }
}
