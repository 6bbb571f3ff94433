//! System call bodies for [`AsyncOp`] variants.
//!
//! Every function here blocks the calling worker thread. Results follow the
//! C convention: a non-negative return value, or `-1` together with the
//! captured `errno`.

use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

use socket2::SockAddr;

use super::request::{AsyncOp, FileStat, OsError, SelectSet};

type Outcome = (i64, Option<OsError>);

pub(super) fn perform(op: &mut AsyncOp) -> Outcome {
    match op {
        AsyncOp::Read { fd, buf } => {
            // SAFETY: `buf` is a live, writable allocation of `buf.len()` bytes.
            check_size(unsafe { libc::read(*fd, buf.as_mut_ptr().cast(), buf.len()) })
        }
        AsyncOp::Write { fd, data } => {
            // SAFETY: `data` is a live allocation of `data.len()` bytes.
            check_size(unsafe { libc::write(*fd, data.as_ptr().cast(), data.len()) })
        }
        AsyncOp::SeekRead { fd, buf, offset } => {
            let Ok(offset) = libc::off_t::try_from(*offset) else {
                return failed(libc::EINVAL);
            };
            // SAFETY: `buf` is a live, writable allocation of `buf.len()` bytes.
            check_size(unsafe { libc::pread(*fd, buf.as_mut_ptr().cast(), buf.len(), offset) })
        }
        AsyncOp::SeekWrite { fd, data, offset } => {
            let Ok(offset) = libc::off_t::try_from(*offset) else {
                return failed(libc::EINVAL);
            };
            // SAFETY: `data` is a live allocation of `data.len()` bytes.
            check_size(unsafe { libc::pwrite(*fd, data.as_ptr().cast(), data.len(), offset) })
        }
        AsyncOp::Recv { sock, buf, flags } => {
            // SAFETY: `buf` is a live, writable allocation of `buf.len()` bytes.
            check_size(unsafe { libc::recv(*sock, buf.as_mut_ptr().cast(), buf.len(), *flags) })
        }
        AsyncOp::RecvFrom {
            sock,
            buf,
            flags,
            from,
        } => recv_from(*sock, buf, *flags, from),
        AsyncOp::Send { sock, data, flags } => {
            // SAFETY: `data` is a live allocation of `data.len()` bytes.
            check_size(unsafe { libc::send(*sock, data.as_ptr().cast(), data.len(), *flags) })
        }
        AsyncOp::SendTo {
            sock,
            data,
            flags,
            to,
        } => {
            // SAFETY: `data` is live for `data.len()` bytes and `to` owns a
            // valid socket address of `to.len()` bytes.
            check_size(unsafe {
                libc::sendto(
                    *sock,
                    data.as_ptr().cast(),
                    data.len(),
                    *flags,
                    to.as_ptr(),
                    to.len(),
                )
            })
        }
        AsyncOp::Accept { sock, peer } => accept(*sock, peer),
        AsyncOp::Connect { sock, addr } => {
            // SAFETY: `addr` owns a valid socket address of `addr.len()` bytes.
            check_int(unsafe { libc::connect(*sock, addr.as_ptr(), addr.len()) })
        }
        AsyncOp::WaitPid {
            pid,
            options,
            status,
        } => {
            let mut raw = 0;
            // SAFETY: `raw` is a valid out-pointer for the duration of the call.
            let outcome = check_int(unsafe { libc::waitpid(*pid, &mut raw, *options) });
            if outcome.1.is_none() {
                *status = Some(raw);
            }
            outcome
        }
        AsyncOp::Select {
            interest,
            timeout,
            ready,
        } => select(interest, *timeout, ready),
        AsyncOp::Open { path, flags, mode } => with_c_path(path, |path| {
            // SAFETY: `path` is NUL-terminated and outlives the call.
            check_int(unsafe { libc::open(path.as_ptr(), *flags, libc::c_uint::from(*mode)) })
        }),
        // SAFETY: closing an arbitrary descriptor is memory safe.
        AsyncOp::Close { fd } => check_int(unsafe { libc::close(*fd) }),
        AsyncOp::Stat { path, stat } => with_c_path(path, |path| {
            stat_into(stat, |buf| {
                // SAFETY: `path` is NUL-terminated and `buf` is writable.
                unsafe { libc::stat(path.as_ptr(), buf) }
            })
        }),
        AsyncOp::Lstat { path, stat } => with_c_path(path, |path| {
            stat_into(stat, |buf| {
                // SAFETY: `path` is NUL-terminated and `buf` is writable.
                unsafe { libc::lstat(path.as_ptr(), buf) }
            })
        }),
        AsyncOp::Fstat { fd, stat } => stat_into(stat, |buf| {
            // SAFETY: `buf` is writable for the duration of the call.
            unsafe { libc::fstat(*fd, buf) }
        }),
        AsyncOp::Remove { path } => with_c_path(path, |path| {
            // SAFETY: `path` is NUL-terminated and outlives the call.
            check_int(unsafe { libc::remove(path.as_ptr()) })
        }),
    }
}

fn check_size(rval: isize) -> Outcome {
    if rval < 0 {
        (-1, Some(OsError::last()))
    } else {
        (i64::try_from(rval).unwrap_or(i64::MAX), None)
    }
}

fn check_int(rval: libc::c_int) -> Outcome {
    if rval < 0 {
        (-1, Some(OsError::last()))
    } else {
        (i64::from(rval), None)
    }
}

const fn failed(code: i32) -> Outcome {
    (-1, Some(OsError::from_raw(code)))
}

fn with_c_path(path: &Path, call: impl FnOnce(&CString) -> Outcome) -> Outcome {
    match CString::new(path.as_os_str().as_bytes()) {
        Ok(path) => call(&path),
        Err(_) => failed(libc::EINVAL),
    }
}

fn stat_into(
    slot: &mut Option<FileStat>,
    call: impl FnOnce(*mut libc::stat) -> libc::c_int,
) -> Outcome {
    // SAFETY: `libc::stat` is plain old data; all-zero is a valid value.
    let mut raw: libc::stat = unsafe { mem::zeroed() };
    let outcome = check_int(call(&mut raw));
    if outcome.1.is_none() {
        *slot = Some(file_stat(&raw));
    }
    outcome
}

#[expect(
    clippy::useless_conversion,
    reason = "stat field widths differ between platforms"
)]
fn file_stat(raw: &libc::stat) -> FileStat {
    FileStat {
        mode: u32::from(raw.st_mode),
        size: u64::try_from(raw.st_size).unwrap_or_default(),
        ino: u64::from(raw.st_ino),
        nlink: u64::from(raw.st_nlink),
        uid: raw.st_uid,
        gid: raw.st_gid,
        atime: i64::from(raw.st_atime),
        mtime: i64::from(raw.st_mtime),
        ctime: i64::from(raw.st_ctime),
    }
}

fn recv_from(sock: RawFd, buf: &mut [u8], flags: i32, from: &mut Option<SockAddr>) -> Outcome {
    let receive = |storage: *mut libc::sockaddr_storage, len: *mut libc::socklen_t| {
        // SAFETY: `buf` is writable for `buf.len()` bytes; `storage` and `len`
        // come from `SockAddr::try_init` and are valid for writes.
        let rval = unsafe {
            libc::recvfrom(
                sock,
                buf.as_mut_ptr().cast(),
                buf.len(),
                flags,
                storage.cast(),
                len,
            )
        };
        if rval < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(rval)
        }
    };
    // SAFETY: `receive` initialises at most `*len` bytes of `storage`.
    match unsafe { SockAddr::try_init(receive) } {
        Ok((rval, addr)) => {
            *from = Some(addr);
            check_size(rval)
        }
        Err(error) => (-1, Some(OsError::from(error))),
    }
}

fn accept(sock: RawFd, peer: &mut Option<SockAddr>) -> Outcome {
    let accept_one = |storage: *mut libc::sockaddr_storage, len: *mut libc::socklen_t| {
        // SAFETY: `storage` and `len` come from `SockAddr::try_init` and are
        // valid for writes.
        let fd = unsafe { libc::accept(sock, storage.cast(), len) };
        if fd < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(fd)
        }
    };
    // SAFETY: `accept_one` initialises at most `*len` bytes of `storage`.
    match unsafe { SockAddr::try_init(accept_one) } {
        Ok((fd, addr)) => {
            *peer = Some(addr);
            check_int(fd)
        }
        Err(error) => (-1, Some(OsError::from(error))),
    }
}

fn select(interest: &SelectSet, timeout: Duration, ready: &mut Option<SelectSet>) -> Outcome {
    let all = interest
        .read
        .iter()
        .chain(&interest.write)
        .chain(&interest.error);
    let mut highest = -1;
    for fd in all {
        if usize::try_from(*fd).map_or(true, |fd| fd >= libc::FD_SETSIZE as usize) {
            return failed(libc::EINVAL);
        }
        highest = highest.max(*fd);
    }

    let mut read = fd_set(&interest.read);
    let mut write = fd_set(&interest.write);
    let mut error = fd_set(&interest.error);
    let mut wait = libc::timeval {
        tv_sec: libc::time_t::try_from(timeout.as_secs()).unwrap_or(libc::time_t::MAX),
        tv_usec: libc::suseconds_t::try_from(timeout.subsec_micros()).unwrap_or_default(),
    };
    // SAFETY: the sets and timeval are initialised locals that outlive the call.
    let outcome = check_int(unsafe {
        libc::select(highest + 1, &mut read, &mut write, &mut error, &mut wait)
    });
    if outcome.1.is_none() {
        *ready = Some(SelectSet {
            read: ready_fds(&interest.read, &read),
            write: ready_fds(&interest.write, &write),
            error: ready_fds(&interest.error, &error),
        });
    }
    outcome
}

fn fd_set(fds: &[RawFd]) -> libc::fd_set {
    // SAFETY: `fd_set` is plain old data; FD_ZERO then initialises it.
    let mut set: libc::fd_set = unsafe { mem::zeroed() };
    // SAFETY: `set` is a valid fd_set and every descriptor was range checked.
    unsafe {
        libc::FD_ZERO(&mut set);
        for fd in fds {
            libc::FD_SET(*fd, &mut set);
        }
    }
    set
}

fn ready_fds(fds: &[RawFd], set: &libc::fd_set) -> Vec<RawFd> {
    fds.iter()
        .copied()
        // SAFETY: `set` is a valid fd_set and every descriptor was range checked.
        .filter(|fd| unsafe { libc::FD_ISSET(*fd, set) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsRawFd;

    #[test]
    fn seek_read_reads_at_offset() {
        let mut file = tempfile::tempfile().expect("temp file");
        file.write_all(b"0123456789").expect("write fixture");
        let mut op = AsyncOp::seek_read(file.as_raw_fd(), 4, 3);
        let (rval, error) = perform(&mut op);
        assert_eq!((rval, error), (4, None));
        let AsyncOp::SeekRead { buf, .. } = op else {
            panic!("operation changed variant");
        };
        assert_eq!(buf, b"3456");
    }

    #[test]
    fn close_of_invalid_descriptor_reports_ebadf() {
        let mut op = AsyncOp::Close { fd: -1 };
        assert_eq!(perform(&mut op), failed(libc::EBADF));
    }

    #[test]
    fn stat_fills_output_slot() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut op = AsyncOp::stat(dir.path());
        let (rval, error) = perform(&mut op);
        assert_eq!((rval, error), (0, None));
        let AsyncOp::Stat { stat: Some(stat), .. } = op else {
            panic!("stat output missing");
        };
        assert!(stat.is_dir());
    }

    #[test]
    fn stat_of_missing_path_reports_enoent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut op = AsyncOp::stat(dir.path().join("missing"));
        assert_eq!(perform(&mut op), failed(libc::ENOENT));
    }

    #[test]
    fn select_times_out_with_empty_ready_sets() {
        let (reader, _writer) = std::os::unix::net::UnixStream::pair().expect("socket pair");
        let mut op = AsyncOp::Select {
            interest: SelectSet {
                read: vec![reader.as_raw_fd()],
                ..SelectSet::default()
            },
            timeout: Duration::from_millis(10),
            ready: None,
        };
        assert_eq!(perform(&mut op), (0, None));
        let AsyncOp::Select { ready: Some(ready), .. } = op else {
            panic!("select output missing");
        };
        assert!(ready.read.is_empty());
    }
}
