//! Blocking operation descriptors and their results.

use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::time::Duration;

use socket2::SockAddr;

use super::syscall;

/// Platform error code captured verbatim from a failed system call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OsError(i32);

impl OsError {
    /// Wraps a raw `errno` value.
    #[must_use]
    pub const fn from_raw(code: i32) -> Self {
        Self(code)
    }

    /// Captures `errno` of the calling thread.
    #[must_use]
    pub fn last() -> Self {
        Self::from(io::Error::last_os_error())
    }

    /// Raw `errno` value.
    #[must_use]
    pub const fn code(self) -> i32 {
        self.0
    }

    /// Converts into a standard IO error carrying the same code.
    #[must_use]
    pub fn to_io_error(self) -> io::Error {
        io::Error::from_raw_os_error(self.0)
    }
}

impl From<io::Error> for OsError {
    fn from(error: io::Error) -> Self {
        Self(error.raw_os_error().unwrap_or(libc::EIO))
    }
}

impl fmt::Display for OsError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.to_io_error())
    }
}

impl std::error::Error for OsError {}

/// Subset of `struct stat` reported by the stat family of requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    /// File type and permission bits.
    pub mode: u32,
    /// Size in bytes.
    pub size: u64,
    /// Inode number.
    pub ino: u64,
    /// Number of hard links.
    pub nlink: u64,
    /// Owner user ID.
    pub uid: u32,
    /// Owner group ID.
    pub gid: u32,
    /// Last access time, seconds since the epoch.
    pub atime: i64,
    /// Last modification time, seconds since the epoch.
    pub mtime: i64,
    /// Last status change time, seconds since the epoch.
    pub ctime: i64,
}

impl FileStat {
    /// Returns `true` for directories.
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.mode & (libc::S_IFMT as u32) == libc::S_IFDIR as u32
    }

    /// Returns `true` for regular files.
    #[must_use]
    pub const fn is_file(&self) -> bool {
        self.mode & (libc::S_IFMT as u32) == libc::S_IFREG as u32
    }

    /// Returns `true` for symbolic links.
    #[must_use]
    pub const fn is_symlink(&self) -> bool {
        self.mode & (libc::S_IFMT as u32) == libc::S_IFLNK as u32
    }
}

/// Descriptor sets watched by a [`AsyncOp::Select`] request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectSet {
    /// Descriptors checked for readability.
    pub read: Vec<RawFd>,
    /// Descriptors checked for writability.
    pub write: Vec<RawFd>,
    /// Descriptors checked for exceptional conditions.
    pub error: Vec<RawFd>,
}

/// Blocking operation executed by a worker thread.
///
/// Variants carry their inputs and, where the call produces more than a
/// return value, an output slot the worker fills in. Read-style buffers are
/// sized by the caller; the request's return value says how many leading
/// bytes hold data.
#[derive(Debug, Clone)]
pub enum AsyncOp {
    /// `read(2)`.
    Read { fd: RawFd, buf: Vec<u8> },
    /// `write(2)`.
    Write { fd: RawFd, data: Vec<u8> },
    /// `pread(2)`.
    SeekRead { fd: RawFd, buf: Vec<u8>, offset: u64 },
    /// `pwrite(2)`.
    SeekWrite { fd: RawFd, data: Vec<u8>, offset: u64 },
    /// `recv(2)`.
    Recv { sock: RawFd, buf: Vec<u8>, flags: i32 },
    /// `recvfrom(2)`; `from` receives the sender address.
    RecvFrom {
        sock: RawFd,
        buf: Vec<u8>,
        flags: i32,
        from: Option<SockAddr>,
    },
    /// `send(2)`.
    Send { sock: RawFd, data: Vec<u8>, flags: i32 },
    /// `sendto(2)`.
    SendTo {
        sock: RawFd,
        data: Vec<u8>,
        flags: i32,
        to: SockAddr,
    },
    /// `accept(2)`; the return value is the new descriptor.
    Accept { sock: RawFd, peer: Option<SockAddr> },
    /// `connect(2)`.
    Connect { sock: RawFd, addr: SockAddr },
    /// `waitpid(2)`; `status` receives the raw wait status.
    WaitPid {
        pid: i32,
        options: i32,
        status: Option<i32>,
    },
    /// `select(2)`; `ready` receives the descriptors reported ready.
    Select {
        interest: SelectSet,
        timeout: Duration,
        ready: Option<SelectSet>,
    },
    /// `open(2)`; the return value is the new descriptor.
    Open { path: PathBuf, flags: i32, mode: u32 },
    /// `close(2)`.
    Close { fd: RawFd },
    /// `stat(2)`.
    Stat { path: PathBuf, stat: Option<FileStat> },
    /// `lstat(2)`.
    Lstat { path: PathBuf, stat: Option<FileStat> },
    /// `fstat(2)`.
    Fstat { fd: RawFd, stat: Option<FileStat> },
    /// `remove(3)`.
    Remove { path: PathBuf },
}

/// Discriminant of [`AsyncOp`], used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncKind {
    Read,
    Write,
    SeekRead,
    SeekWrite,
    Recv,
    RecvFrom,
    Send,
    SendTo,
    Accept,
    Connect,
    WaitPid,
    Select,
    Open,
    Close,
    Stat,
    Lstat,
    Fstat,
    Remove,
}

impl fmt::Display for AsyncKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::SeekRead => "seek_read",
            Self::SeekWrite => "seek_write",
            Self::Recv => "recv",
            Self::RecvFrom => "recv_from",
            Self::Send => "send",
            Self::SendTo => "send_to",
            Self::Accept => "accept",
            Self::Connect => "connect",
            Self::WaitPid => "waitpid",
            Self::Select => "select",
            Self::Open => "open",
            Self::Close => "close",
            Self::Stat => "stat",
            Self::Lstat => "lstat",
            Self::Fstat => "fstat",
            Self::Remove => "remove",
        };
        formatter.write_str(label)
    }
}

impl AsyncOp {
    /// Discriminant for logging and assertions.
    #[must_use]
    pub const fn kind(&self) -> AsyncKind {
        match self {
            Self::Read { .. } => AsyncKind::Read,
            Self::Write { .. } => AsyncKind::Write,
            Self::SeekRead { .. } => AsyncKind::SeekRead,
            Self::SeekWrite { .. } => AsyncKind::SeekWrite,
            Self::Recv { .. } => AsyncKind::Recv,
            Self::RecvFrom { .. } => AsyncKind::RecvFrom,
            Self::Send { .. } => AsyncKind::Send,
            Self::SendTo { .. } => AsyncKind::SendTo,
            Self::Accept { .. } => AsyncKind::Accept,
            Self::Connect { .. } => AsyncKind::Connect,
            Self::WaitPid { .. } => AsyncKind::WaitPid,
            Self::Select { .. } => AsyncKind::Select,
            Self::Open { .. } => AsyncKind::Open,
            Self::Close { .. } => AsyncKind::Close,
            Self::Stat { .. } => AsyncKind::Stat,
            Self::Lstat { .. } => AsyncKind::Lstat,
            Self::Fstat { .. } => AsyncKind::Fstat,
            Self::Remove { .. } => AsyncKind::Remove,
        }
    }

    /// Builds a `read` of up to `len` bytes.
    #[must_use]
    pub fn read(fd: RawFd, len: usize) -> Self {
        Self::Read {
            fd,
            buf: vec![0; len],
        }
    }

    /// Builds a `pread` of up to `len` bytes at `offset`.
    #[must_use]
    pub fn seek_read(fd: RawFd, len: usize, offset: u64) -> Self {
        Self::SeekRead {
            fd,
            buf: vec![0; len],
            offset,
        }
    }

    /// Builds a `recv` of up to `len` bytes.
    #[must_use]
    pub fn recv(sock: RawFd, len: usize, flags: i32) -> Self {
        Self::Recv {
            sock,
            buf: vec![0; len],
            flags,
        }
    }

    /// Builds a `stat` of `path`.
    #[must_use]
    pub fn stat(path: impl Into<PathBuf>) -> Self {
        Self::Stat {
            path: path.into(),
            stat: None,
        }
    }
}

/// A blocking operation together with its outcome.
///
/// The request travels to a worker thread and back to the dispatcher inside
/// the completion callback; no other thread touches it in between.
#[derive(Debug, Clone)]
pub struct AsyncRequest {
    op: AsyncOp,
    rval: i64,
    error: Option<OsError>,
}

impl AsyncRequest {
    /// Wraps an operation that has not run yet.
    #[must_use]
    pub const fn new(op: AsyncOp) -> Self {
        Self {
            op,
            rval: 0,
            error: None,
        }
    }

    /// Operation and its output slots.
    #[must_use]
    pub const fn op(&self) -> &AsyncOp {
        &self.op
    }

    /// Consumes the request, returning its operation.
    #[must_use]
    pub fn into_op(self) -> AsyncOp {
        self.op
    }

    /// Discriminant of the operation.
    #[must_use]
    pub const fn kind(&self) -> AsyncKind {
        self.op.kind()
    }

    /// Raw return value of the system call; `-1` on failure.
    #[must_use]
    pub const fn rval(&self) -> i64 {
        self.rval
    }

    /// Error captured from the system call, if it failed.
    #[must_use]
    pub const fn error(&self) -> Option<OsError> {
        self.error
    }

    /// Return value or captured error.
    pub fn result(&self) -> Result<i64, OsError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.rval),
        }
    }

    /// Bytes produced by a successful read-style request.
    ///
    /// Returns `None` for failed requests and for operations without an input
    /// buffer.
    #[must_use]
    pub fn received(&self) -> Option<&[u8]> {
        let len = usize::try_from(self.result().ok()?).ok()?;
        let buf = match &self.op {
            AsyncOp::Read { buf, .. }
            | AsyncOp::SeekRead { buf, .. }
            | AsyncOp::Recv { buf, .. }
            | AsyncOp::RecvFrom { buf, .. } => buf,
            _ => return None,
        };
        buf.get(..len)
    }

    /// Runs the operation on the calling thread, recording its outcome.
    pub(crate) fn execute(&mut self) {
        let (rval, error) = syscall::perform(&mut self.op);
        self.rval = rval;
        self.error = error;
    }

    /// Marks the request failed without running it.
    pub(crate) fn fail(&mut self, error: OsError) {
        self.rval = -1;
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn received_reports_only_filled_prefix() {
        let mut request = AsyncRequest::new(AsyncOp::Read {
            fd: 0,
            buf: b"hello world".to_vec(),
        });
        request.rval = 5;
        assert_eq!(request.received(), Some(&b"hello"[..]));
    }

    #[test]
    fn failed_request_exposes_error_verbatim() {
        let mut request = AsyncRequest::new(AsyncOp::Close { fd: -1 });
        request.fail(OsError::from_raw(libc::EBADF));
        assert_eq!(request.rval(), -1);
        assert_eq!(request.result(), Err(OsError::from_raw(libc::EBADF)));
        assert_eq!(request.received(), None);
    }

    #[test]
    fn file_stat_classifies_mode_bits() {
        let stat = FileStat {
            mode: libc::S_IFDIR as u32 | 0o755,
            ..FileStat::default()
        };
        assert!(stat.is_dir());
        assert!(!stat.is_file());
    }
}
