// SPDX-License-Identifier: MIT
//
// Log routing. Foreground processes write compact lines to stderr; the
// daemonised server forwards every event to the system log, which is
// the only place a process with closed stdio can report from.

use std::io::{self, Write};

use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Stderr logging for the foreground server and the tests.
pub fn init_foreground() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .compact()
        .try_init();
}

/// Syslog logging for the daemonised server. `openlog` keeps the ident
/// pointer, so it must stay alive for the process lifetime.
pub fn init_daemon() {
    static IDENT: &[u8] = b"bmp_server\0";
    unsafe {
        libc::openlog(
            IDENT.as_ptr() as *const libc::c_char,
            libc::LOG_PID,
            libc::LOG_DAEMON,
        );
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .without_time() // syslog stamps lines itself
        .with_writer(Syslog)
        .try_init();
}

/// `MakeWriter` that forwards each formatted event to `syslog(3)` with
/// a priority derived from the tracing level.
struct Syslog;

impl<'a> MakeWriter<'a> for Syslog {
    type Writer = SyslogLine;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogLine::new(libc::LOG_INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        let level = *meta.level();
        let priority = if level == Level::ERROR {
            libc::LOG_ERR
        } else if level == Level::WARN {
            libc::LOG_WARNING
        } else if level == Level::INFO {
            libc::LOG_INFO
        } else {
            libc::LOG_DEBUG
        };
        SyslogLine::new(priority)
    }
}

/// One buffered event, flushed to syslog when the writer is dropped.
struct SyslogLine {
    priority: libc::c_int,
    buf: Vec<u8>,
}

impl SyslogLine {
    fn new(priority: libc::c_int) -> Self {
        Self {
            priority,
            buf: Vec::with_capacity(256),
        }
    }

    fn emit(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        // syslog is given the bytes via %s, never as a format string.
        static FMT: &[u8] = b"%s\0";
        let mut line = std::mem::take(&mut self.buf);
        while line.last() == Some(&b'\n') {
            line.pop();
        }
        line.retain(|&b| b != 0);
        line.push(0);
        unsafe {
            libc::syslog(
                self.priority,
                FMT.as_ptr() as *const libc::c_char,
                line.as_ptr() as *const libc::c_char,
            );
        }
    }
}

impl Write for SyslogLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit();
        Ok(())
    }
}

impl Drop for SyslogLine {
    fn drop(&mut self) {
        self.emit();
    }
}
