//! Seam between channels and the byte-stream transports that carry them.

use super::ChannelId;
use crate::agent::Agent;
use crate::asyncreq::{AsyncRequest, Executor, ExecutorError, OsError};

/// Outcome of feeding a completed request back to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Nothing for the channel layer to act on.
    Idle,
    /// Bytes arrived from the peer.
    Received(Vec<u8>),
    /// The connection ended, cleanly or with an error.
    Disconnected(Option<OsError>),
}

/// Byte-stream implementation owned by exactly one channel.
///
/// All methods run on the dispatcher thread. Blocking work goes through
/// [`ChannelLink::submit`]; each completed request comes back through
/// [`ChannelTransport::complete`].
pub trait ChannelTransport {
    /// Transport name, such as `TCP`.
    fn name(&self) -> &str;

    /// Begins exchanging bytes. Called once, when the channel is started.
    ///
    /// # Errors
    ///
    /// Fails when the executor refuses the initial request.
    fn start(&mut self, link: &mut ChannelLink<'_>) -> Result<(), ExecutorError>;

    /// Queues `bytes` for delivery to the peer.
    ///
    /// # Errors
    ///
    /// Fails when the executor refuses the send request.
    fn write_block(&mut self, link: &mut ChannelLink<'_>, bytes: &[u8])
    -> Result<(), ExecutorError>;

    /// Consumes a request this transport submitted earlier.
    fn complete(&mut self, link: &mut ChannelLink<'_>, request: AsyncRequest) -> TransportEvent;

    /// Tears the connection down. Called at most once per channel.
    ///
    /// Must cause outstanding requests to finish promptly; the channel stays
    /// alive until each of them has completed.
    fn close(&mut self, link: &mut ChannelLink<'_>);
}

/// Borrowed access a transport uses to issue requests for its channel.
///
/// Every accepted submission holds a channel lock that is released when the
/// completion is delivered, so the channel and its socket outlive the worker
/// using them.
pub struct ChannelLink<'a> {
    id: ChannelId,
    locks: &'a mut usize,
    executor: &'a Executor<Agent>,
}

impl<'a> ChannelLink<'a> {
    pub(crate) fn new(id: ChannelId, locks: &'a mut usize, executor: &'a Executor<Agent>) -> Self {
        Self {
            id,
            locks,
            executor,
        }
    }

    /// Channel this link belongs to.
    #[must_use]
    pub const fn id(&self) -> ChannelId {
        self.id
    }

    /// Submits `request`; its completion is routed back to this channel's
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ShuttingDown`] once executor shutdown has
    /// begun.
    pub fn submit(&mut self, request: AsyncRequest) -> Result<(), ExecutorError> {
        let id = self.id;
        self.executor
            .submit(request, move |agent: &mut Agent, request| {
                agent.transport_completed(id, request);
            })?;
        *self.locks += 1;
        Ok(())
    }
}
