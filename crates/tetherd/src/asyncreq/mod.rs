//! Asynchronous execution of blocking system calls.
//!
//! The dispatcher thread must never block. Operations that may block (socket
//! IO, file IO, process waits) are described as an [`AsyncRequest`] and handed
//! to the [`Executor`], whose workers run the call and post the finished
//! request back to the dispatcher.

mod errors;
mod pool;
mod request;
mod syscall;

pub(crate) const ASYNCREQ_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::asyncreq");

pub use errors::ExecutorError;
pub use pool::{Executor, ExecutorStats};
pub use request::{AsyncKind, AsyncOp, AsyncRequest, FileStat, OsError, SelectSet};
