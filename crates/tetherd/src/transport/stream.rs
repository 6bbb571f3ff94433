//! Byte-stream channel transport over connected sockets.

use std::io;
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use tracing::{debug, trace};

use super::{TRANSPORT_TARGET, TransportKind};
use crate::asyncreq::{AsyncKind, AsyncOp, AsyncRequest, ExecutorError};
use crate::channel::{ChannelLink, ChannelTransport, TransportEvent};

/// Largest block requested from the socket per receive.
const READ_BLOCK: usize = 0x4000;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: i32 = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: i32 = 0;

/// Connected socket carried by a channel.
#[derive(Debug)]
pub enum ConnectionStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl ConnectionStream {
    /// Shuts down both directions, waking any worker blocked on the socket.
    ///
    /// # Errors
    ///
    /// Returns the OS error, except that an already disconnected socket is
    /// not an error.
    pub fn shutdown(&self) -> io::Result<()> {
        let result = match self {
            Self::Tcp(stream) => stream.shutdown(Shutdown::Both),
            Self::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Err(error) if error.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl AsRawFd for ConnectionStream {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Tcp(stream) => stream.as_raw_fd(),
            Self::Unix(stream) => stream.as_raw_fd(),
        }
    }
}

impl From<TcpStream> for ConnectionStream {
    fn from(stream: TcpStream) -> Self {
        Self::Tcp(stream)
    }
}

impl From<UnixStream> for ConnectionStream {
    fn from(stream: UnixStream) -> Self {
        Self::Unix(stream)
    }
}

/// [`ChannelTransport`] reading and writing a socket through the executor.
///
/// One receive is kept outstanding while the channel is open. Writes are
/// queued and sent one request at a time, so bytes reach the peer in write
/// order even when a send is partial. The socket is closed when the channel
/// is destroyed, which only happens after every request has completed.
#[derive(Debug)]
pub struct StreamTransport {
    kind: TransportKind,
    stream: ConnectionStream,
    outbox: Vec<u8>,
    sending: bool,
    closing: bool,
}

impl StreamTransport {
    /// Wraps a connected socket.
    #[must_use]
    pub fn new(kind: TransportKind, stream: impl Into<ConnectionStream>) -> Self {
        Self {
            kind,
            stream: stream.into(),
            outbox: Vec::new(),
            sending: false,
            closing: false,
        }
    }

    /// Bytes written but not yet handed to a send request.
    #[must_use]
    pub fn pending_output(&self) -> usize {
        self.outbox.len()
    }

    fn submit_recv(&self, link: &mut ChannelLink<'_>) -> Result<(), ExecutorError> {
        let fd = self.stream.as_raw_fd();
        link.submit(AsyncRequest::new(AsyncOp::recv(fd, READ_BLOCK, 0)))
    }

    fn flush(&mut self, link: &mut ChannelLink<'_>) -> Result<(), ExecutorError> {
        if self.sending || self.outbox.is_empty() {
            return Ok(());
        }
        let data = std::mem::take(&mut self.outbox);
        let request = AsyncRequest::new(AsyncOp::Send {
            sock: self.stream.as_raw_fd(),
            data,
            flags: SEND_FLAGS,
        });
        link.submit(request)?;
        self.sending = true;
        Ok(())
    }

    fn received(&mut self, link: &mut ChannelLink<'_>, request: &AsyncRequest) -> TransportEvent {
        let bytes = match request.result() {
            Err(error) if !self.closing => return TransportEvent::Disconnected(Some(error)),
            Err(_) | Ok(0) => return TransportEvent::Disconnected(None),
            Ok(_) => request.received().unwrap_or_default().to_vec(),
        };
        if self.closing {
            return TransportEvent::Idle;
        }
        if let Err(error) = self.submit_recv(link) {
            debug!(
                target: TRANSPORT_TARGET,
                channel = %link.id(),
                error = %error,
                "receive not resubmitted"
            );
        }
        TransportEvent::Received(bytes)
    }

    fn sent(&mut self, link: &mut ChannelLink<'_>, request: AsyncRequest) -> TransportEvent {
        self.sending = false;
        let outcome = request.result();
        let AsyncOp::Send { mut data, .. } = request.into_op() else {
            return TransportEvent::Idle;
        };
        match outcome {
            Err(error) => TransportEvent::Disconnected(Some(error)),
            Ok(written) => {
                let written = usize::try_from(written).unwrap_or(0).min(data.len());
                data.drain(..written);
                if !data.is_empty() {
                    trace!(
                        target: TRANSPORT_TARGET,
                        channel = %link.id(),
                        remaining = data.len(),
                        "partial send"
                    );
                    data.append(&mut self.outbox);
                    self.outbox = data;
                }
                if self.closing {
                    return TransportEvent::Idle;
                }
                match self.flush(link) {
                    Ok(()) => TransportEvent::Idle,
                    Err(_) => TransportEvent::Disconnected(None),
                }
            }
        }
    }
}

impl ChannelTransport for StreamTransport {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn start(&mut self, link: &mut ChannelLink<'_>) -> Result<(), ExecutorError> {
        self.submit_recv(link)
    }

    fn write_block(
        &mut self,
        link: &mut ChannelLink<'_>,
        bytes: &[u8],
    ) -> Result<(), ExecutorError> {
        if self.closing {
            return Ok(());
        }
        self.outbox.extend_from_slice(bytes);
        self.flush(link)
    }

    fn complete(&mut self, link: &mut ChannelLink<'_>, request: AsyncRequest) -> TransportEvent {
        match request.kind() {
            AsyncKind::Recv => self.received(link, &request),
            AsyncKind::Send => self.sent(link, request),
            other => {
                debug!(
                    target: TRANSPORT_TARGET,
                    channel = %link.id(),
                    kind = %other,
                    "unexpected completion ignored"
                );
                TransportEvent::Idle
            }
        }
    }

    fn close(&mut self, link: &mut ChannelLink<'_>) {
        self.closing = true;
        self.outbox.clear();
        if let Err(error) = self.stream.shutdown() {
            debug!(
                target: TRANSPORT_TARGET,
                channel = %link.id(),
                error = %error,
                "socket shutdown failed"
            );
        }
    }
}
