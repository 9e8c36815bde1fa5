// SPDX-License-Identifier: MIT
//
// The server: exclusive owner of every named IPC object, single-
// threaded dispatcher over the request ring, and admission controller
// for the forked workers.
//
// Signal handlers are restricted to the async-signal-safe set: they
// flip an atomic flag, post a semaphore through a module-level raw
// handle, or drain waitpid. The handles are published here during
// startup and cleared during teardown, which is why they are statics
// rather than fields.

use std::io;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::daemon::PidFile;
use crate::error::ServiceError;
use crate::names::{PID_FILE, SEM_CONFIG, SEM_WORKERS};
use crate::platform::posix::install_signal_handler;
use crate::platform::PlatformSem;
use crate::ring::{RingHost, RingNames};
use crate::worker;

// ---------------------------------------------------------------------------
// Signal context
// ---------------------------------------------------------------------------

static RUNNING: AtomicBool = AtomicBool::new(true);
static RELOAD_PENDING: AtomicBool = AtomicBool::new(false);

/// `full` semaphore handle for the shutdown handler's sentinel post.
static SENTINEL_FULL: AtomicPtr<libc::sem_t> = AtomicPtr::new(ptr::null_mut());

/// `workers` semaphore handle for the reaper's admission release.
static ADMISSION: AtomicPtr<libc::sem_t> = AtomicPtr::new(ptr::null_mut());

extern "C" fn on_shutdown(_: libc::c_int) {
    RUNNING.store(false, Ordering::Release);
    // One sentinel token so a dispatcher blocked on `full` unblocks
    // even if the signal landed just before it entered the wait.
    let sem = SENTINEL_FULL.load(Ordering::Acquire);
    if !sem.is_null() {
        unsafe { libc::sem_post(sem) };
    }
}

extern "C" fn on_reload(_: libc::c_int) {
    // No sentinel: `full` tokens must stay in one-to-one correspondence
    // with pending requests; the EINTR return of the interrupted wait
    // is wake-up enough.
    RELOAD_PENDING.store(true, Ordering::Release);
}

extern "C" fn on_child_exit(_: libc::c_int) {
    // Drain every ready child; each one hands its admission token back.
    loop {
        let pid = unsafe { libc::waitpid(-1, ptr::null_mut(), libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
        let sem = ADMISSION.load(Ordering::Acquire);
        if !sem.is_null() {
            unsafe { libc::sem_post(sem) };
        }
    }
}

fn running() -> bool {
    RUNNING.load(Ordering::Acquire)
}

fn take_reload_flag() -> bool {
    RELOAD_PENDING.swap(false, Ordering::AcqRel)
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

pub struct Server {
    config: ServerConfig,
    config_mutex: PlatformSem,
    ring: RingHost,
    workers: PlatformSem,
    /// max_workers value the admission semaphore is currently sized to.
    workers_capacity: u32,
    _pid_file: PidFile,
}

impl Server {
    /// Bring the service up: load configuration, bind every IPC name
    /// with exclusive-create semantics (any collision means another
    /// server owns them), install the signal handlers, write the pid
    /// file and publish the handler handles.
    pub fn start() -> Result<Self, ServiceError> {
        let config = ServerConfig::load();

        let config_mutex = PlatformSem::create(SEM_CONFIG, 1).map_err(|e| {
            if e.raw_os_error() == Some(libc::EEXIST) {
                ServiceError::AlreadyRunning {
                    name: SEM_CONFIG.to_string(),
                }
            } else {
                ServiceError::Io {
                    context: "create config mutex",
                    source: e,
                }
            }
        })?;

        let on_err = |context: &'static str| {
            move |e: io::Error| {
                PlatformSem::unlink_by_name(SEM_CONFIG);
                ServiceError::Io { context, source: e }
            }
        };

        for signo in [libc::SIGINT, libc::SIGTERM] {
            install_signal_handler(signo, on_shutdown)
                .map_err(on_err("install shutdown handler"))?;
        }
        install_signal_handler(libc::SIGHUP, on_reload)
            .map_err(on_err("install reload handler"))?;
        install_signal_handler(libc::SIGCHLD, on_child_exit)
            .map_err(on_err("install child-exit handler"))?;

        let ring = match RingHost::create(RingNames::global()) {
            Ok(ring) => ring,
            Err(err) => {
                PlatformSem::unlink_by_name(SEM_CONFIG);
                return Err(err);
            }
        };

        let workers = match PlatformSem::create(SEM_WORKERS, config.max_workers) {
            Ok(sem) => sem,
            Err(e) => {
                ring.unlink();
                PlatformSem::unlink_by_name(SEM_CONFIG);
                return Err(if e.raw_os_error() == Some(libc::EEXIST) {
                    ServiceError::AlreadyRunning {
                        name: SEM_WORKERS.to_string(),
                    }
                } else {
                    ServiceError::Io {
                        context: "create worker semaphore",
                        source: e,
                    }
                });
            }
        };

        let pid_file = match PidFile::write(PID_FILE) {
            Ok(pid_file) => pid_file,
            Err(e) => {
                ring.unlink();
                PlatformSem::unlink_by_name(SEM_WORKERS);
                PlatformSem::unlink_by_name(SEM_CONFIG);
                return Err(ServiceError::Io {
                    context: "write pid file",
                    source: e,
                });
            }
        };

        RUNNING.store(true, Ordering::Release);
        RELOAD_PENDING.store(false, Ordering::Release);
        SENTINEL_FULL.store(ring.full_sem().raw(), Ordering::Release);
        ADMISSION.store(workers.raw(), Ordering::Release);

        info!(%config, "server started");
        Ok(Self {
            workers_capacity: config.max_workers,
            config,
            config_mutex,
            ring,
            workers,
            _pid_file: pid_file,
        })
    }

    /// The dispatch loop: admission token first, then one request off
    /// the ring, then fork. Runs until the shutdown flag flips.
    pub fn run(&mut self) -> io::Result<()> {
        let Self {
            config,
            config_mutex,
            ring,
            workers,
            workers_capacity,
            ..
        } = self;
        let mut consumer = ring.consumer();

        info!("ready for requests");
        'dispatch: while running() {
            if take_reload_flag() {
                apply_reload(config, workers_capacity, config_mutex, workers)?;
            }
            if !workers.wait_interruptible()? {
                continue; // signal: re-check the flags
            }

            // Admission token held from here until the child is reaped.
            let request = loop {
                if !running() {
                    break None;
                }
                if take_reload_flag() {
                    apply_reload(config, workers_capacity, config_mutex, workers)?;
                }
                if !consumer.wait_request()? {
                    continue; // signal: re-check the flags
                }
                if !running() {
                    break None; // sentinel token, not a request
                }
                break Some(consumer.take()?);
            };
            let Some(request) = request else {
                break 'dispatch;
            };

            match unsafe { libc::fork() } {
                -1 => {
                    error!(err = %io::Error::last_os_error(), "fork failed, dropping request");
                    workers.post()?;
                }
                0 => {
                    // Child: everything server-owned is logically
                    // abandoned; only the request, the config record
                    // and its mutex matter now. _exit skips the
                    // parent's teardown.
                    let code = worker::run(&request, config, config_mutex);
                    unsafe { libc::_exit(code) };
                }
                pid => {
                    debug!(pid, client = request.client_id, "worker forked");
                }
            }
        }

        info!("server is shutting down");
        Ok(())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        // Unpublish the handler handles before the semaphores close.
        SENTINEL_FULL.store(ptr::null_mut(), Ordering::Release);
        ADMISSION.store(ptr::null_mut(), Ordering::Release);

        self.ring.unlink();
        PlatformSem::unlink_by_name(SEM_WORKERS);
        PlatformSem::unlink_by_name(SEM_CONFIG);
        info!("server is shut down");
    }
}

/// Re-parse the configuration and reconcile the admission counter:
/// a lowered `max_workers` drains tokens (waiting for running workers
/// if needed), a raised one releases new ones.
fn apply_reload(
    config: &mut ServerConfig,
    workers_capacity: &mut u32,
    config_mutex: &PlatformSem,
    workers: &PlatformSem,
) -> io::Result<()> {
    let fresh = ServerConfig::reload(config);

    config_mutex.wait()?;
    *config = fresh;
    config_mutex.post()?;

    let old = *workers_capacity;
    let new = fresh.max_workers;
    if new < old {
        for drained in 0..old - new {
            loop {
                if !running() {
                    // Shutdown preempts the reconciliation.
                    *workers_capacity = old - drained;
                    return Ok(());
                }
                if workers.wait_interruptible()? {
                    break;
                }
            }
        }
    } else {
        for _ in 0..new - old {
            workers.post()?;
        }
    }
    *workers_capacity = new;
    if new != old {
        info!(old, new, "worker capacity reconciled");
    }
    Ok(())
}
