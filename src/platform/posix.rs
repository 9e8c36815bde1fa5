// SPDX-License-Identifier: MIT
//
// POSIX implementation of the two named kernel objects the service is
// built on: shared-memory segments (shm_open + mmap) and counting
// semaphores (sem_open family).
//
// Exclusive creation doubles as the server's single-instance lock: a
// creation collision means another server already owns the IPC names,
// and the caller must not force-unlink them.

use std::ffi::CString;
use std::io;
use std::ptr;

/// Mode bits for every named IPC object (masked by the caller's umask).
pub const IPC_PERMS: libc::mode_t = 0o666;

fn c_name(name: &str) -> io::Result<CString> {
    if !name.starts_with('/') || name.len() < 2 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("IPC name must start with '/': {name:?}"),
        ));
    }
    CString::new(name.as_bytes()).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

// ---------------------------------------------------------------------------
// PlatformShm — POSIX shared memory
// ---------------------------------------------------------------------------

/// Open mode for a shared memory segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    /// Create exclusively — fail with `EEXIST` if the name is taken.
    Create,
    /// Open existing — fail with `ENOENT` if it does not exist.
    Open,
}

/// A named shared memory region mapped into this process.
///
/// The creator sizes the segment with `ftruncate`; openers map whatever
/// size the creator established. Dropping the handle unmaps but never
/// unlinks — the name is owned by the server, which removes it
/// explicitly on shutdown.
#[derive(Debug)]
pub struct PlatformShm {
    mem: *mut u8,
    size: usize,
}

// The mapped region is process-shared; the semaphore protocol layered
// on top establishes the access discipline.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    /// Acquire a named shared memory region of `size` bytes.
    pub fn acquire(name: &str, size: usize, mode: ShmMode) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }
        let c = c_name(name)?;

        let fd = match mode {
            ShmMode::Create => {
                let fd = unsafe {
                    libc::shm_open(
                        c.as_ptr(),
                        libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                        IPC_PERMS as libc::c_uint,
                    )
                };
                if fd == -1 {
                    return Err(io::Error::last_os_error());
                }
                // umask may have stripped group/other bits at creation.
                unsafe { libc::fchmod(fd, IPC_PERMS) };
                if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
                    let err = io::Error::last_os_error();
                    unsafe { libc::close(fd) };
                    return Err(err);
                }
                fd
            }
            ShmMode::Open => {
                let fd = unsafe { libc::shm_open(c.as_ptr(), libc::O_RDWR, 0) };
                if fd == -1 {
                    return Err(io::Error::last_os_error());
                }
                fd
            }
        };

        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            mem: mem as *mut u8,
            size,
        })
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    /// Remove a named segment without an open handle. Errors (including
    /// `ENOENT`) are deliberately ignored: unlink is teardown-only.
    pub fn unlink_by_name(name: &str) {
        if let Ok(c) = c_name(name) {
            unsafe { libc::shm_unlink(c.as_ptr()) };
        }
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        if !self.mem.is_null() {
            unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformSem — POSIX named counting semaphore
// ---------------------------------------------------------------------------

/// A named counting semaphore (`sem_open` object).
///
/// Binary uses (the ring write mutex, the config mutex) are value-1
/// semaphores; the producer/consumer tokens (`empty`, `full`) and the
/// worker admission counter are true counting uses.
#[derive(Debug)]
pub struct PlatformSem {
    sem: *mut libc::sem_t,
}

unsafe impl Send for PlatformSem {}
unsafe impl Sync for PlatformSem {}

impl PlatformSem {
    /// Create a named semaphore exclusively with the given initial value.
    /// Fails with `EEXIST` if the name is already bound.
    pub fn create(name: &str, value: u32) -> io::Result<Self> {
        let c = c_name(name)?;
        let sem = unsafe {
            libc::sem_open(
                c.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                IPC_PERMS as libc::c_uint,
                value as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { sem })
    }

    /// Open an existing named semaphore. Fails with `ENOENT` if absent —
    /// for the client that means the server is not running.
    pub fn open(name: &str) -> io::Result<Self> {
        let c = c_name(name)?;
        let sem = unsafe { libc::sem_open(c.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { sem })
    }

    /// Decrement, blocking until the value is positive. `EINTR` retries.
    pub fn wait(&self) -> io::Result<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINTR) {
                return Err(err);
            }
        }
    }

    /// Decrement, blocking, but return `Ok(false)` when a signal handler
    /// interrupts the wait so the caller can re-check its flags. The
    /// server dispatch loop depends on this for shutdown and reload.
    pub fn wait_interruptible(&self) -> io::Result<bool> {
        if unsafe { libc::sem_wait(self.sem) } == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            return Ok(false);
        }
        Err(err)
    }

    /// Non-blocking decrement. `Ok(false)` when the value is zero.
    pub fn try_wait(&self) -> io::Result<bool> {
        if unsafe { libc::sem_trywait(self.sem) } == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(false),
            _ => Err(err),
        }
    }

    /// Increment, waking one waiter.
    pub fn post(&self) -> io::Result<()> {
        if unsafe { libc::sem_post(self.sem) } == 0 {
            return Ok(());
        }
        Err(io::Error::last_os_error())
    }

    /// Raw handle for async-signal-safe posting from signal handlers.
    pub fn raw(&self) -> *mut libc::sem_t {
        self.sem
    }

    /// Remove a named semaphore. Teardown-only; errors ignored.
    pub fn unlink_by_name(name: &str) {
        if let Ok(c) = c_name(name) {
            unsafe { libc::sem_unlink(c.as_ptr()) };
        }
    }
}

impl Drop for PlatformSem {
    fn drop(&mut self) {
        unsafe { libc::sem_close(self.sem) };
    }
}

// ---------------------------------------------------------------------------
// Signal installation
// ---------------------------------------------------------------------------

/// Install `handler` for `signo` via `sigaction`, deliberately without
/// `SA_RESTART`: the dispatch loop's `sem_wait` and the worker's FIFO
/// writes must observe `EINTR` so they can re-check their flags.
pub fn install_signal_handler(signo: libc::c_int, handler: extern "C" fn(libc::c_int)) -> io::Result<()> {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = handler as usize;
        libc::sigemptyset(&mut sa.sa_mask);
        sa.sa_flags = 0;
        if libc::sigaction(signo, &sa, ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn unique_name(prefix: &str) -> String {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("/{prefix}_{}_{n}", std::process::id())
    }

    #[test]
    fn shm_create_open_roundtrip() {
        let name = unique_name("bmpd_shm");
        let created = PlatformShm::acquire(&name, 128, ShmMode::Create).expect("create");
        unsafe { created.as_mut_ptr().write_bytes(0xAB, 128) };

        let opened = PlatformShm::acquire(&name, 128, ShmMode::Open).expect("open");
        assert_eq!(unsafe { *opened.as_mut_ptr() }, 0xAB);

        PlatformShm::unlink_by_name(&name);
    }

    #[test]
    fn shm_exclusive_create_collides() {
        let name = unique_name("bmpd_shm_excl");
        let _first = PlatformShm::acquire(&name, 64, ShmMode::Create).expect("create");
        let second = PlatformShm::acquire(&name, 64, ShmMode::Create);
        assert_eq!(
            second.err().and_then(|e| e.raw_os_error()),
            Some(libc::EEXIST)
        );
        PlatformShm::unlink_by_name(&name);
    }

    #[test]
    fn shm_open_missing_is_enoent() {
        let name = unique_name("bmpd_shm_missing");
        let err = PlatformShm::acquire(&name, 64, ShmMode::Open).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn sem_counts_tokens() {
        let name = unique_name("bmpd_sem");
        let sem = PlatformSem::create(&name, 2).expect("create");
        assert!(sem.try_wait().unwrap());
        assert!(sem.try_wait().unwrap());
        assert!(!sem.try_wait().unwrap());
        sem.post().unwrap();
        assert!(sem.try_wait().unwrap());
        PlatformSem::unlink_by_name(&name);
    }

    #[test]
    fn sem_open_missing_is_enoent() {
        let name = unique_name("bmpd_sem_missing");
        let err = PlatformSem::open(&name).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }
}
