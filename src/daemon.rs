// SPDX-License-Identifier: MIT
//
// Daemonisation and the pid file. The server detaches with the classic
// double fork: the first fork lets the parent return to the shell, the
// setsid drops the controlling terminal, and the second fork ensures
// the daemon can never reacquire one. Stdio is pointed at /dev/null;
// from then on the system log is the only output channel.

use std::ffi::CString;
use std::io;
use std::path::PathBuf;

/// Detach from the terminal. On success the caller is the daemon
/// process, with `/` as working directory and stdio on /dev/null.
pub fn daemonize() -> io::Result<()> {
    fork_and_exit_parent()?;
    if unsafe { libc::setsid() } == -1 {
        return Err(io::Error::last_os_error());
    }
    fork_and_exit_parent()?;

    let root = CString::new("/").unwrap();
    if unsafe { libc::chdir(root.as_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }

    redirect_stdio_to_dev_null()
}

fn fork_and_exit_parent() -> io::Result<()> {
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(()),
        _ => unsafe { libc::_exit(0) },
    }
}

fn redirect_stdio_to_dev_null() -> io::Result<()> {
    let dev_null = CString::new("/dev/null").unwrap();
    let fd = unsafe { libc::open(dev_null.as_ptr(), libc::O_RDWR) };
    if fd == -1 {
        return Err(io::Error::last_os_error());
    }
    for std_fd in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if unsafe { libc::dup2(fd, std_fd) } == -1 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
    }
    if fd > libc::STDERR_FILENO {
        unsafe { libc::close(fd) };
    }
    Ok(())
}

/// The server's pid file; removed again when the handle drops.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn write(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        std::fs::write(&path, format!("{}\n", std::process::id()))?;
        Ok(Self { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_file_appears_and_disappears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bmpd.pid");
        {
            let _pid = PidFile::write(&path).unwrap();
            let text = std::fs::read_to_string(&path).unwrap();
            assert_eq!(text.trim().parse::<u32>().unwrap(), std::process::id());
        }
        assert!(!path.exists());
    }
}
