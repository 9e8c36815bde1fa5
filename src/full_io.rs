// SPDX-License-Identifier: MIT
//
// Short-count and EINTR handling for the raw fds the service passes
// around (FIFO ends, output files). Partial reads and writes are
// resumed; interrupted calls are retried unless the caller's abort
// predicate says the interruption was the write-timeout alarm.

use std::io;
use std::os::unix::io::RawFd;

/// Read until `buf` is filled or EOF. Returns the number of bytes read;
/// a short count means the peer closed early.
pub fn full_read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0usize;
    while total < buf.len() {
        let n = unsafe {
            libc::read(
                fd,
                buf[total..].as_mut_ptr() as *mut libc::c_void,
                buf.len() - total,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
        if n == 0 {
            break; // EOF
        }
        total += n as usize;
    }
    Ok(total)
}

/// Write the whole of `buf`, resuming short writes and retrying EINTR.
pub fn full_write(fd: RawFd, buf: &[u8]) -> io::Result<()> {
    full_write_until(fd, buf, || false)
}

/// Write the whole of `buf`; on every interrupted call, consult `abort`
/// and bail out with `TimedOut` if it fires. The worker passes the
/// alarm-fired flag here so a dead client cannot pin it forever.
pub fn full_write_until(fd: RawFd, buf: &[u8], abort: impl Fn() -> bool) -> io::Result<()> {
    let mut total = 0usize;
    while total < buf.len() {
        let n = unsafe {
            libc::write(
                fd,
                buf[total..].as_ptr() as *const libc::c_void,
                buf.len() - total,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                if abort() {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "write interrupted by timeout alarm",
                    ));
                }
                continue;
            }
            return Err(err);
        }
        if n == 0 {
            // A zero-length write on a pipe should not happen; treat it
            // like the original full_io does.
            return Err(io::Error::from_raw_os_error(libc::ENOSPC));
        }
        total += n as usize;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;

    fn pipe() -> (std::fs::File, std::fs::File) {
        let mut fds = [0 as libc::c_int; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        unsafe {
            use std::os::unix::io::FromRawFd;
            (
                std::fs::File::from_raw_fd(fds[0]),
                std::fs::File::from_raw_fd(fds[1]),
            )
        }
    }

    #[test]
    fn roundtrip_through_a_pipe() {
        let (rd, wr) = pipe();
        let payload: Vec<u8> = (0..2048).map(|i| (i % 251) as u8).collect();

        let expected = payload.clone();
        let writer = std::thread::spawn(move || {
            full_write(wr.as_raw_fd(), &payload).expect("write");
            drop(wr);
        });

        let mut buf = vec![0u8; 2048];
        let n = full_read(rd.as_raw_fd(), &mut buf).expect("read");
        writer.join().unwrap();

        assert_eq!(n, 2048);
        assert_eq!(buf, expected);
    }

    #[test]
    fn read_reports_short_count_on_eof() {
        let (rd, wr) = pipe();
        full_write(wr.as_raw_fd(), b"abc").expect("write");
        drop(wr);

        let mut buf = [0u8; 16];
        let n = full_read(rd.as_raw_fd(), &mut buf).expect("read");
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], b"abc");
    }
}
