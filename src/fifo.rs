// SPDX-License-Identifier: MIT
//
// The per-request response channel: a named FIFO at
// `/tmp/fifo_rep_<client-pid>`. The client creates it before its
// request becomes visible on the ring, so the worker always finds the
// node ready, and removes it once the response is consumed. Wire
// format: a 4-byte LE status word, then — iff the status is 0 — the
// filtered image bytes verbatim. Because every filter edits pixels in
// place, the body is exactly `stat(input).st_size` bytes.
//
// The worker guards every chunk it writes with an alarm so a client
// that died mid-response cannot pin the worker forever.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Status;
use crate::full_io;
use crate::names::{self, WRITE_TIMEOUT_SECS};
use crate::platform::posix::{install_signal_handler, IPC_PERMS};

/// The platform's atomic pipe-write size; response chunks fit in it so
/// each alarm guards one bounded write.
pub const CHUNK_SIZE: usize = libc::PIPE_BUF;

// ---------------------------------------------------------------------------
// Write-timeout alarm
// ---------------------------------------------------------------------------

static WRITE_TIMED_OUT: AtomicBool = AtomicBool::new(false);

extern "C" fn on_alarm(_: libc::c_int) {
    WRITE_TIMED_OUT.store(true, Ordering::Relaxed);
}

/// Install the SIGALRM handler backing the per-chunk write timeout.
/// The worker calls this once, immediately after the fork.
pub fn install_write_timeout_handler() -> io::Result<()> {
    install_signal_handler(libc::SIGALRM, on_alarm)
}

/// One chunk write bounded by the timeout alarm. `EINTR` from unrelated
/// signals retries; `EINTR` after the alarm fired aborts with
/// `TimedOut`.
fn guarded_write(fd: i32, chunk: &[u8]) -> io::Result<()> {
    WRITE_TIMED_OUT.store(false, Ordering::Relaxed);
    unsafe { libc::alarm(WRITE_TIMEOUT_SECS) };
    let result = full_io::full_write_until(fd, chunk, || WRITE_TIMED_OUT.load(Ordering::Relaxed));
    unsafe { libc::alarm(0) };
    result
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Client-side handle for its response FIFO. The client owns the path:
/// it creates the FIFO before the worker looks for it, reads the
/// response, and unlinks it (also on drop, so error paths clean up).
pub struct ResponseFifo {
    path: PathBuf,
}

impl ResponseFifo {
    /// Create the FIFO node for `client_id` with mode 0666 (masked by
    /// umask).
    pub fn create(client_id: libc::pid_t) -> io::Result<Self> {
        let path = PathBuf::from(names::response_fifo_path(client_id));
        let c = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        if unsafe { libc::mkfifo(c.as_ptr(), IPC_PERMS) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { path })
    }

    /// Open the read end. Blocks until the worker opens the write end.
    pub fn open_reader(&self) -> io::Result<File> {
        File::open(&self.path)
    }

    /// Read the 4-byte status word off the front of the response.
    pub fn read_status(reader: &File) -> io::Result<Status> {
        let mut word = [0u8; 4];
        let n = full_io::full_read(reader.as_raw_fd(), &mut word)?;
        if n != 4 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "worker closed the response before the status word",
            ));
        }
        Ok(Status::from_le_bytes(word))
    }
}

impl Drop for ResponseFifo {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// ---------------------------------------------------------------------------
// Worker side
// ---------------------------------------------------------------------------

/// Worker-side write end of a client's FIFO.
pub struct ResponseWriter {
    file: File,
}

impl ResponseWriter {
    /// Open the write end of `client_id`'s FIFO. Blocks until the
    /// client has the read end open; fails with `ENOENT` if the client
    /// never created the node.
    pub fn open(client_id: libc::pid_t) -> io::Result<Self> {
        let path = names::response_fifo_path(client_id);
        let file = OpenOptions::new().write(true).open(path)?;
        Ok(Self { file })
    }

    /// Write the status word, alarm-guarded like every other chunk.
    pub fn send_status(&mut self, status: Status) -> io::Result<()> {
        guarded_write(self.file.as_raw_fd(), &status.to_le_bytes())
    }

    /// Stream the image bytes in `PIPE_BUF`-sized chunks, each bounded
    /// by the write timeout.
    pub fn send_image(&mut self, bytes: &[u8]) -> io::Result<()> {
        for chunk in bytes.chunks(CHUNK_SIZE) {
            guarded_write(self.file.as_raw_fd(), chunk)?;
        }
        Ok(())
    }
}
