//! Stream-socket transports for channels.
//!
//! Servers bind TCP or UNIX sockets described by a [`PeerDescriptor`] and
//! accept through the executor; each accepted or connected socket becomes a
//! channel driven by a [`StreamTransport`].

mod connect;
mod errors;
mod server;
mod stream;

use std::fmt;

use crate::peer::{PeerDescriptor, TRANSPORT_NAME};

pub use self::connect::{ConnectCallback, PendingConnects};
pub use self::errors::TransportError;
pub use self::server::{AcceptCallback, ChannelServer, ServerId, ServerRegistry};
pub use self::stream::{ConnectionStream, StreamTransport};

pub use tether_config::DEFAULT_TCP_PORT;

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Transport implementations selectable by `TransportName`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Stream sockets over TCP/IP.
    Tcp,
    /// Stream sockets in the UNIX domain.
    Unix,
}

impl TransportKind {
    /// Value of the `TransportName` property for this kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Unix => "UNIX",
        }
    }

    /// Exact, case-sensitive lookup by transport name.
    ///
    /// `SSL` is not an alias for `TCP`: there is no TLS layer, and serving it
    /// as plain TCP would misreport the channel's security.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "TCP" => Some(Self::Tcp),
            "UNIX" => Some(Self::Unix),
            _ => None,
        }
    }

    /// Picks the transport for `peer`, recording `TCP` when the descriptor
    /// names none.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unsupported`] for unknown names.
    pub fn select(peer: &mut PeerDescriptor) -> Result<Self, TransportError> {
        let Some(name) = peer.transport_name() else {
            peer.insert(TRANSPORT_NAME, Self::Tcp.name());
            return Ok(Self::Tcp);
        };
        Self::from_name(name).ok_or_else(|| TransportError::Unsupported {
            name: name.to_owned(),
        })
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses the `Port` property, falling back to [`DEFAULT_TCP_PORT`].
pub(crate) fn tcp_port(peer: &PeerDescriptor) -> Result<u16, TransportError> {
    match peer.port().filter(|port| !port.is_empty()) {
        None => Ok(DEFAULT_TCP_PORT),
        Some(port) => port.parse().map_err(|_| TransportError::InvalidPort {
            port: port.to_owned(),
        }),
    }
}
