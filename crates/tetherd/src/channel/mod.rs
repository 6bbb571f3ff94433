//! Transport-agnostic channel layer.
//!
//! Channels, broadcast groups and listener lists live in the [`Agent`]
//! context and are only touched on the dispatcher thread. Transports reach
//! blocking IO through the executor via a [`ChannelLink`]; completions come
//! back to the owning channel as posted callbacks.
//!
//! [`Agent`]: crate::agent::Agent

mod broadcast;
mod errors;
mod lifecycle;
mod link;
mod listeners;
mod protocol;
mod registry;
mod state;

use std::fmt;

pub(crate) const CHANNEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::channel");

pub use broadcast::SPLICE_BLOCK_SIZE;
pub use errors::ChannelError;
pub use link::{ChannelLink, ChannelTransport, TransportEvent};
pub use listeners::{ChannelEvent, ChannelListener, ChannelListeners};
pub use protocol::Protocol;
pub use registry::{BroadcastGroup, Channel, ChannelRegistry};
pub use state::ChannelState;

/// Handle of a channel. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub(crate) u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "ch{}", self.0)
    }
}

/// Handle of a broadcast group. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub(crate) u64);

impl fmt::Display for GroupId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "bg{}", self.0)
    }
}
