//! Outbound connections that become channels.

use std::collections::HashMap;
use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;

use socket2::{Domain, SockAddr, Socket, Type};
use tracing::{debug, info};

use super::stream::{ConnectionStream, StreamTransport};
use super::{TRANSPORT_TARGET, TransportError, TransportKind, tcp_port};
use crate::agent::Agent;
use crate::asyncreq::{AsyncOp, AsyncRequest};
use crate::channel::{ChannelError, ChannelId};
use crate::peer::PeerDescriptor;

/// Receives the outcome of [`Agent::connect`] exactly once.
pub type ConnectCallback = Box<dyn FnOnce(&mut Agent, Result<ChannelId, ChannelError>)>;

struct PendingConnect {
    kind: TransportKind,
    peer_name: String,
    socket: Socket,
    callback: ConnectCallback,
}

/// Connect requests submitted to the executor and not yet completed.
#[derive(Default)]
pub struct PendingConnects {
    pending: HashMap<u64, PendingConnect>,
    next_token: u64,
}

impl PendingConnects {
    /// Number of connects in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` when no connect is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl fmt::Debug for PendingConnects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingConnects")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

struct Target {
    kind: TransportKind,
    peer_name: String,
    socket: Socket,
    addr: SockAddr,
}

fn resolve(peer: &mut PeerDescriptor) -> Result<Target, TransportError> {
    let kind = TransportKind::select(peer)?;
    match kind {
        TransportKind::Tcp => {
            let host = peer
                .host()
                .filter(|host| !host.is_empty())
                .unwrap_or("127.0.0.1");
            let port = tcp_port(peer)?;
            let addr = (host, port)
                .to_socket_addrs()
                .map_err(|source| TransportError::Resolve {
                    host: host.to_owned(),
                    port,
                    source,
                })?
                .next()
                .ok_or_else(|| TransportError::ResolveEmpty {
                    host: host.to_owned(),
                    port,
                })?;
            let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)
                .map_err(|source| TransportError::Socket { source })?;
            Ok(Target {
                kind,
                peer_name: addr.to_string(),
                socket,
                addr: addr.into(),
            })
        }
        TransportKind::Unix => {
            let path = peer
                .host()
                .filter(|path| !path.is_empty())
                .ok_or(TransportError::MissingPath)?;
            let addr = SockAddr::unix(path).map_err(|source| TransportError::Socket { source })?;
            let socket = Socket::new(Domain::UNIX, Type::STREAM, None)
                .map_err(|source| TransportError::Socket { source })?;
            Ok(Target {
                kind,
                peer_name: path.to_owned(),
                socket,
                addr,
            })
        }
    }
}

impl Agent {
    /// Opens a client channel to `peer`.
    ///
    /// The transport is chosen as for servers. Name resolution happens on
    /// the calling thread; the connect itself runs on a worker. `callback`
    /// runs exactly once on the dispatcher thread with the new channel, still
    /// in `StartWait`, or with the error. Errors detected before submission
    /// are delivered before this method returns.
    pub fn connect<F>(&mut self, mut peer: PeerDescriptor, callback: F)
    where
        F: FnOnce(&mut Self, Result<ChannelId, ChannelError>) + 'static,
    {
        if self.is_shutting_down() {
            callback(self, Err(ChannelError::ShuttingDown));
            return;
        }
        let target = match resolve(&mut peer) {
            Ok(target) => target,
            Err(error) => {
                callback(self, Err(error.into()));
                return;
            }
        };

        self.connects.next_token += 1;
        let token = self.connects.next_token;
        let request = AsyncRequest::new(AsyncOp::Connect {
            sock: target.socket.as_raw_fd(),
            addr: target.addr,
        });
        if let Err(error) = self
            .executor
            .submit(request, move |agent: &mut Self, request| {
                agent.connect_completed(token, &request);
            })
        {
            callback(self, Err(error.into()));
            return;
        }
        debug!(
            target: TRANSPORT_TARGET,
            peer = %target.peer_name,
            transport = %target.kind,
            "connect submitted"
        );
        self.connects.pending.insert(
            token,
            PendingConnect {
                kind: target.kind,
                peer_name: target.peer_name,
                socket: target.socket,
                callback: Box::new(callback),
            },
        );
    }

    fn connect_completed(&mut self, token: u64, request: &AsyncRequest) {
        let Some(pending) = self.connects.pending.remove(&token) else {
            return;
        };
        let PendingConnect {
            kind,
            peer_name,
            socket,
            callback,
        } = pending;

        let outcome: Result<ChannelId, ChannelError> = match request.result() {
            Err(source) => Err(TransportError::Connect {
                peer: peer_name,
                source,
            }
            .into()),
            Ok(_) if self.is_shutting_down() => Err(ChannelError::ShuttingDown),
            Ok(_) => {
                let stream: ConnectionStream = match kind {
                    TransportKind::Tcp => TcpStream::from(socket).into(),
                    TransportKind::Unix => UnixStream::from(socket).into(),
                };
                info!(
                    target: TRANSPORT_TARGET,
                    peer = %peer_name,
                    transport = %kind,
                    "connected"
                );
                let transport = StreamTransport::new(kind, stream);
                Ok(self.create_channel(peer_name, Box::new(transport)))
            }
        };
        callback(self, outcome);
        self.update_channels_shutdown();
    }
}
