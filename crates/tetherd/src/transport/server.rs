//! Channel servers: listening sockets that turn connections into channels.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use socket2::{SockAddr, SockRef};
use tracing::{debug, error, info, warn};

use super::stream::{ConnectionStream, StreamTransport};
use super::{TRANSPORT_TARGET, TransportError, TransportKind, tcp_port};
use crate::agent::Agent;
use crate::asyncreq::{AsyncOp, AsyncRequest, ExecutorError, OsError};
use crate::channel::{ChannelError, ChannelId};
use crate::peer::{PORT, PeerDescriptor};

/// Callback receiving each channel a server accepts, still in `StartWait`.
pub type AcceptCallback = Box<dyn FnMut(&mut Agent, ChannelId)>;

/// Handle of a channel server. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(pub(crate) u64);

impl fmt::Display for ServerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "srv{}", self.0)
    }
}

#[derive(Debug)]
enum ServerSocket {
    Tcp(TcpListener),
    Unix { listener: UnixListener, path: PathBuf },
}

impl ServerSocket {
    fn bind(kind: TransportKind, peer: &mut PeerDescriptor) -> Result<Self, TransportError> {
        match kind {
            TransportKind::Tcp => {
                let listener = bind_tcp(peer.host().unwrap_or_default(), tcp_port(peer)?)?;
                let bound = listener
                    .local_addr()
                    .map_err(|source| TransportError::LocalAddr { source })?;
                peer.insert(PORT, bound.port().to_string());
                Ok(Self::Tcp(listener))
            }
            TransportKind::Unix => {
                let path = peer
                    .host()
                    .filter(|path| !path.is_empty())
                    .map(PathBuf::from)
                    .ok_or(TransportError::MissingPath)?;
                let listener = bind_unix(&path)?;
                Ok(Self::Unix { listener, path })
            }
        }
    }

    fn shutdown(&self) {
        let result = match self {
            Self::Tcp(listener) => SockRef::from(listener).shutdown(Shutdown::Both),
            Self::Unix { listener, .. } => SockRef::from(listener).shutdown(Shutdown::Both),
        };
        if let Err(error) = result
            && error.kind() != io::ErrorKind::NotConnected
        {
            debug!(
                target: TRANSPORT_TARGET,
                error = %error,
                "listening socket shutdown failed"
            );
        }
    }

    fn cleanup(&self) {
        let Self::Unix { path, .. } = self else {
            return;
        };
        if let Err(error) = fs::remove_file(path)
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(
                target: TRANSPORT_TARGET,
                error = %error,
                path = %path.display(),
                "failed to remove unix socket file"
            );
        }
    }

    fn adopt(&self, fd: OwnedFd, from: Option<&SockAddr>) -> (String, ConnectionStream) {
        match self {
            Self::Tcp(_) => {
                let name = from
                    .and_then(SockAddr::as_socket)
                    .map_or_else(|| "tcp peer".to_owned(), |addr| addr.to_string());
                (name, TcpStream::from(fd).into())
            }
            Self::Unix { path, .. } => (path.display().to_string(), UnixStream::from(fd).into()),
        }
    }
}

impl AsRawFd for ServerSocket {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Tcp(listener) => listener.as_raw_fd(),
            Self::Unix { listener, .. } => listener.as_raw_fd(),
        }
    }
}

/// A bound listening socket and the callback fed its connections.
pub struct ChannelServer {
    id: ServerId,
    kind: TransportKind,
    peer: PeerDescriptor,
    socket: ServerSocket,
    on_accept: Option<AcceptCallback>,
    accepting: bool,
    closed: bool,
}

impl ChannelServer {
    /// Server handle.
    #[must_use]
    pub const fn id(&self) -> ServerId {
        self.id
    }

    /// Transport serving this endpoint.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Properties of the bound endpoint; `Port` holds the bound port.
    #[must_use]
    pub const fn peer(&self) -> &PeerDescriptor {
        &self.peer
    }

    /// Address of a TCP server's listening socket.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.socket {
            ServerSocket::Tcp(listener) => listener.local_addr().ok(),
            ServerSocket::Unix { .. } => None,
        }
    }

    /// Returns `true` once the server has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl fmt::Debug for ChannelServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelServer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("peer", &self.peer)
            .field("accepting", &self.accepting)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Dispatcher-owned set of live channel servers.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    servers: BTreeMap<ServerId, ChannelServer>,
    next_id: u64,
}

impl ServerRegistry {
    /// Looks up a live server.
    #[must_use]
    pub fn get(&self, id: ServerId) -> Option<&ChannelServer> {
        self.servers.get(&id)
    }

    /// Handles of live servers in creation order.
    #[must_use]
    pub fn ids(&self) -> Vec<ServerId> {
        self.servers.keys().copied().collect()
    }

    /// Live servers in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &ChannelServer> {
        self.servers.values()
    }

    /// Number of live servers, including closed ones awaiting their accept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Returns `true` when no servers are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    fn next_id(&mut self) -> ServerId {
        self.next_id += 1;
        ServerId(self.next_id)
    }
}

fn is_transient(error: OsError) -> bool {
    matches!(error.code(), libc::EINTR | libc::ECONNABORTED | libc::EAGAIN)
}

impl Agent {
    /// Binds a server for `peer` and starts accepting connections.
    ///
    /// The transport is chosen by `TransportName`, defaulting to `TCP`.
    /// Every accepted connection becomes a channel in `StartWait` that is
    /// handed to `on_accept`; the callback decides whether to start it.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ShuttingDown`] once shutdown has begun, or the
    /// selection, bind or executor failure. Failures are also reported to the
    /// health reporter.
    pub fn start_server<F>(
        &mut self,
        mut peer: PeerDescriptor,
        on_accept: F,
    ) -> Result<ServerId, ChannelError>
    where
        F: FnMut(&mut Self, ChannelId) + 'static,
    {
        if self.is_shutting_down() {
            return Err(ChannelError::ShuttingDown);
        }
        let requested = peer.to_json();
        let bound = TransportKind::select(&mut peer).and_then(|kind| {
            let socket = ServerSocket::bind(kind, &mut peer)?;
            Ok((kind, socket))
        });
        let (kind, socket) = match bound {
            Ok(bound) => bound,
            Err(error) => {
                self.reporter.server_failed(&requested, &error.to_string());
                return Err(error.into());
            }
        };

        let id = self.servers.next_id();
        self.servers.servers.insert(
            id,
            ChannelServer {
                id,
                kind,
                peer,
                socket,
                on_accept: Some(Box::new(on_accept)),
                accepting: false,
                closed: false,
            },
        );
        if let Err(error) = self.submit_accept(id) {
            self.reporter.server_failed(&requested, &error.to_string());
            self.shut_server(id);
            return Err(error.into());
        }
        if let Some(server) = self.servers.get(id) {
            info!(
                target: TRANSPORT_TARGET,
                server = %id,
                transport = %kind,
                properties = %server.peer,
                "channel server listening"
            );
            self.reporter.server_listening(&server.peer);
        }
        Ok(id)
    }

    /// Looks up a live server.
    #[must_use]
    pub fn server(&self, id: ServerId) -> Option<&ChannelServer> {
        self.servers.get(id)
    }

    /// Replaces the callback receiving a server's accepted channels.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UnknownServer`] for stale handles.
    pub fn set_accept_callback<F>(&mut self, id: ServerId, on_accept: F) -> Result<(), ChannelError>
    where
        F: FnMut(&mut Self, ChannelId) + 'static,
    {
        let server = self
            .servers
            .servers
            .get_mut(&id)
            .ok_or(ChannelError::UnknownServer(id))?;
        server.on_accept = Some(Box::new(on_accept));
        Ok(())
    }

    /// Stops accepting and releases the listening socket once the pending
    /// accept has returned. Closing a closed server does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UnknownServer`] for stale handles.
    pub fn close_server(&mut self, id: ServerId) -> Result<(), ChannelError> {
        if self.servers.get(id).is_none() {
            return Err(ChannelError::UnknownServer(id));
        }
        self.shut_server(id);
        Ok(())
    }

    pub(crate) fn shut_server(&mut self, id: ServerId) {
        let Some(server) = self.servers.servers.get_mut(&id) else {
            return;
        };
        if server.closed {
            return;
        }
        server.closed = true;
        server.on_accept = None;
        server.socket.shutdown();
        info!(target: TRANSPORT_TARGET, server = %id, "channel server closed");
        self.reporter.server_closed(&server.peer);
        self.release_server(id);
    }

    fn submit_accept(&mut self, id: ServerId) -> Result<(), ExecutorError> {
        let Some(server) = self.servers.servers.get_mut(&id) else {
            return Ok(());
        };
        let request = AsyncRequest::new(AsyncOp::Accept {
            sock: server.socket.as_raw_fd(),
            peer: None,
        });
        self.executor
            .submit(request, move |agent: &mut Self, request| {
                agent.server_accepted(id, request);
            })?;
        server.accepting = true;
        Ok(())
    }

    fn server_accepted(&mut self, id: ServerId, request: AsyncRequest) {
        let Some(server) = self.servers.servers.get_mut(&id) else {
            return;
        };
        server.accepting = false;
        let outcome = request.result();
        let AsyncOp::Accept { peer: from, .. } = request.into_op() else {
            return;
        };
        let accepted = outcome.map(|fd| match RawFd::try_from(fd) {
            // SAFETY: a successful accept returns a fresh descriptor nobody owns.
            Ok(fd) => Some(unsafe { OwnedFd::from_raw_fd(fd) }),
            Err(_) => None,
        });

        if server.closed {
            drop(accepted);
            self.release_server(id);
            return;
        }

        match accepted {
            Ok(Some(fd)) => {
                let (peer_name, stream) = server.socket.adopt(fd, from.as_ref());
                let kind = server.kind;
                let mut on_accept = server.on_accept.take();
                let channel =
                    self.create_channel(peer_name, Box::new(StreamTransport::new(kind, stream)));
                match on_accept.as_mut() {
                    Some(callback) => callback(self, channel),
                    None => {
                        warn!(
                            target: TRANSPORT_TARGET,
                            server = %id,
                            channel = %channel,
                            "no accept callback; closing channel"
                        );
                        self.close_channel(channel);
                    }
                }
                if let Some(server) = self.servers.servers.get_mut(&id)
                    && !server.closed
                    && server.on_accept.is_none()
                {
                    server.on_accept = on_accept;
                }
            }
            Ok(None) => {
                error!(target: TRANSPORT_TARGET, server = %id, "accept returned an invalid descriptor");
            }
            Err(error) if is_transient(error) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    server = %id,
                    error = %error,
                    "transient accept error"
                );
            }
            Err(error) => {
                self.fail_server(id, &error.to_string());
                return;
            }
        }

        if self.servers.get(id).is_some_and(|server| !server.closed)
            && let Err(error) = self.submit_accept(id)
        {
            self.fail_server(id, &error.to_string());
        }
    }

    fn fail_server(&mut self, id: ServerId, reason: &str) {
        if let Some(server) = self.servers.get(id) {
            error!(
                target: TRANSPORT_TARGET,
                server = %id,
                error = reason,
                "channel server failed"
            );
            self.reporter.server_failed(&server.peer.to_json(), reason);
        }
        self.shut_server(id);
    }

    /// Drops a closed server once no accept is outstanding.
    fn release_server(&mut self, id: ServerId) {
        let release = self
            .servers
            .get(id)
            .is_some_and(|server| server.closed && !server.accepting);
        if !release {
            return;
        }
        if let Some(server) = self.servers.servers.remove(&id) {
            server.socket.cleanup();
            debug!(target: TRANSPORT_TARGET, server = %id, "channel server released");
        }
        self.update_channels_shutdown();
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, TransportError> {
    let host = if host.is_empty() { "0.0.0.0" } else { host };
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| TransportError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })?;
    TcpListener::bind(addr).map_err(|source| TransportError::BindTcp { addr, source })
}

fn bind_unix(path: &Path) -> Result<UnixListener, TransportError> {
    if path.exists() {
        let metadata =
            fs::symlink_metadata(path).map_err(|source| TransportError::UnixMetadata {
                path: path.display().to_string(),
                source,
            })?;
        if !metadata.file_type().is_socket() {
            return Err(TransportError::UnixNotSocket {
                path: path.display().to_string(),
            });
        }
        match UnixStream::connect(path) {
            Ok(_stream) => {
                return Err(TransportError::UnixInUse {
                    path: path.display().to_string(),
                });
            }
            Err(error)
                if error.kind() == io::ErrorKind::ConnectionRefused
                    || error.kind() == io::ErrorKind::NotFound =>
            {
                fs::remove_file(path).map_err(|source| TransportError::UnixCleanup {
                    path: path.display().to_string(),
                    source,
                })?;
            }
            Err(source) => {
                return Err(TransportError::UnixProbe {
                    path: path.display().to_string(),
                    source,
                });
            }
        }
    }

    UnixListener::bind(path).map_err(|source| TransportError::BindUnix {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_bind_records_the_bound_port() {
        let mut peer = crate::peer::parse_locator("TCP:127.0.0.1:0").expect("locator");
        let socket = ServerSocket::bind(TransportKind::Tcp, &mut peer).expect("bind tcp");
        let ServerSocket::Tcp(listener) = &socket else {
            panic!("expected a tcp listener");
        };
        let port = listener.local_addr().expect("local addr").port();
        assert_ne!(port, 0);
        assert_eq!(peer.port(), Some(port.to_string().as_str()));
    }

    #[test]
    fn unix_bind_replaces_stale_socket_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("agent.sock");
        {
            let _stale = UnixListener::bind(&path).expect("bind stale listener");
        }
        assert!(path.exists(), "stale socket should remain");

        let listener = bind_unix(&path).expect("bind over stale socket");
        UnixStream::connect(&path).expect("connect unix client");
        drop(listener);
    }

    #[test]
    fn unix_bind_rejects_in_use_socket() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("agent.sock");
        let _existing = UnixListener::bind(&path).expect("bind existing listener");

        let error = bind_unix(&path).expect_err("bind should fail");
        assert!(matches!(error, TransportError::UnixInUse { .. }));
    }

    #[test]
    fn unix_bind_rejects_regular_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("agent.sock");
        fs::write(&path, b"not a socket").expect("write file");

        let error = bind_unix(&path).expect_err("bind should fail");
        assert!(matches!(error, TransportError::UnixNotSocket { .. }));
    }

    #[test]
    fn unix_servers_require_a_path() {
        let mut peer = crate::peer::parse_locator("UNIX:").expect("locator");
        let error = ServerSocket::bind(TransportKind::Unix, &mut peer).expect_err("no path");
        assert!(matches!(error, TransportError::MissingPath));
    }
}
