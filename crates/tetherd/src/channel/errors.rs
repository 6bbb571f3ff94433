//! Error types for channel, broadcast group and server operations.

use thiserror::Error;

use super::{ChannelId, ChannelState, GroupId};
use crate::asyncreq::{ExecutorError, OsError};
use crate::peer::LocatorError;
use crate::transport::{ServerId, TransportError};

/// Errors returned by channel layer operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No live channel has this handle.
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),
    /// No live broadcast group has this handle.
    #[error("unknown broadcast group {0}")]
    UnknownGroup(GroupId),
    /// No live server has this handle.
    #[error("unknown channel server {0}")]
    UnknownServer(ServerId),
    /// The operation is not valid in the channel's current state.
    #[error("cannot {operation} channel {channel} in state {state}")]
    InvalidState {
        channel: ChannelId,
        state: ChannelState,
        operation: &'static str,
    },
    /// The channel has been closed.
    #[error("channel {0} is closed")]
    Closed(ChannelId),
    /// Shutdown has begun; no new channels or servers are accepted.
    #[error("channel subsystem is shutting down")]
    ShuttingDown,
    /// Reading the source descriptor of a splice failed.
    #[error("failed to read splice source: {source}")]
    Splice {
        #[source]
        source: OsError,
    },
    #[error(transparent)]
    Locator(#[from] LocatorError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<ExecutorError> for ChannelError {
    fn from(source: ExecutorError) -> Self {
        Self::Transport(TransportError::Executor(source))
    }
}
