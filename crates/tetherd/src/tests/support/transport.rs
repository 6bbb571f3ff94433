//! In-memory transport and protocol doubles for channel scenarios.

use std::cell::RefCell;
use std::rc::Rc;

use crate::agent::Agent;
use crate::asyncreq::{AsyncKind, AsyncOp, AsyncRequest, ExecutorError};
use crate::channel::{ChannelId, ChannelLink, ChannelTransport, Protocol, TransportEvent};

/// Observations made by a [`MockTransport`].
#[derive(Debug, Default)]
pub struct TransportLog {
    pub starts: usize,
    pub writes: Vec<Vec<u8>>,
    pub closes: usize,
    pub completions: Vec<AsyncKind>,
}

/// Transport that records calls and optionally submits one request on start.
pub struct MockTransport {
    log: Rc<RefCell<TransportLog>>,
    start_op: Option<AsyncOp>,
    reject_writes: bool,
}

impl MockTransport {
    /// Builds a transport and the log it writes to.
    #[must_use]
    pub fn new() -> (Self, Rc<RefCell<TransportLog>>) {
        let log = Rc::new(RefCell::new(TransportLog::default()));
        let transport = Self {
            log: Rc::clone(&log),
            start_op: None,
            reject_writes: false,
        };
        (transport, log)
    }

    /// Submits `op` through the channel link when the channel starts.
    #[must_use]
    pub fn submitting_on_start(mut self, op: AsyncOp) -> Self {
        self.start_op = Some(op);
        self
    }

    /// Fails every write as if the executor had shut down.
    #[must_use]
    pub const fn rejecting_writes(mut self) -> Self {
        self.reject_writes = true;
        self
    }
}

impl ChannelTransport for MockTransport {
    fn name(&self) -> &str {
        "MOCK"
    }

    fn start(&mut self, link: &mut ChannelLink<'_>) -> Result<(), ExecutorError> {
        self.log.borrow_mut().starts += 1;
        match self.start_op.take() {
            Some(op) => link.submit(AsyncRequest::new(op)),
            None => Ok(()),
        }
    }

    fn write_block(
        &mut self,
        _link: &mut ChannelLink<'_>,
        bytes: &[u8],
    ) -> Result<(), ExecutorError> {
        if self.reject_writes {
            return Err(ExecutorError::ShuttingDown {
                kind: AsyncKind::Send,
            });
        }
        self.log.borrow_mut().writes.push(bytes.to_vec());
        Ok(())
    }

    fn complete(&mut self, _link: &mut ChannelLink<'_>, request: AsyncRequest) -> TransportEvent {
        self.log.borrow_mut().completions.push(request.kind());
        TransportEvent::Idle
    }

    fn close(&mut self, _link: &mut ChannelLink<'_>) {
        self.log.borrow_mut().closes += 1;
    }
}

/// Protocol recording what the channel layer delivers to it.
#[derive(Debug, Default)]
pub struct RecordingProtocol {
    pub received: RefCell<Vec<(ChannelId, Vec<u8>)>>,
    pub opened: RefCell<Vec<ChannelId>>,
    pub closed: RefCell<Vec<ChannelId>>,
}

impl Protocol for RecordingProtocol {
    fn receive(&self, _agent: &mut Agent, channel: ChannelId, bytes: &[u8]) {
        self.received.borrow_mut().push((channel, bytes.to_vec()));
    }

    fn opened(&self, _agent: &mut Agent, channel: ChannelId) {
        self.opened.borrow_mut().push(channel);
    }

    fn closed(&self, _agent: &mut Agent, channel: ChannelId) {
        self.closed.borrow_mut().push(channel);
    }
}
