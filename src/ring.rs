// SPDX-License-Identifier: MIT
//
// The request ring: a fixed-capacity circular buffer of filter requests
// in a named shared-memory segment, driven by the classic three-
// semaphore producer/consumer rendezvous (`empty` tokens for free
// slots, `full` tokens for pending requests, a binary `write` semaphore
// serialising producers around the shared write index).
//
// Clients are the producers; the server is the single consumer and
// keeps its read index in private memory. A request is visible to the
// consumer only after the producer has released the write mutex and
// posted `full`, so a half-written slot is never observed.

use std::io;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::ServiceError;
use crate::filters::FilterId;
use crate::names::{self, PATH_CAP, RING_CAP};
use crate::platform::{PlatformSem, PlatformShm, ShmMode};

// ---------------------------------------------------------------------------
// Shared layout
// ---------------------------------------------------------------------------

/// One ring slot: a fixed-size request record.
///
/// The layout is the client/server wire contract. `path` is a
/// zero-padded byte array (not length-prefixed) so every slot is
/// addressable by offset.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FilterRequest {
    pub client_id: libc::pid_t,
    pub path: [u8; PATH_CAP],
    pub filter: u32,
}

impl FilterRequest {
    /// Build a request for `path`. Fails if the path does not fit the
    /// fixed field (one byte is reserved so the field stays
    /// NUL-terminated for any reader).
    pub fn new(client_id: libc::pid_t, path: &Path, filter: FilterId) -> Result<Self, ServiceError> {
        use std::os::unix::ffi::OsStrExt;
        let bytes = path.as_os_str().as_bytes();
        if bytes.is_empty() || bytes.len() >= PATH_CAP {
            return Err(ServiceError::InvalidImage("input path too long"));
        }
        let mut buf = [0u8; PATH_CAP];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            client_id,
            path: buf,
            filter: filter as u32,
        })
    }

    /// The request path (bytes up to the first NUL).
    pub fn path(&self) -> &Path {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let len = self
            .path
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(PATH_CAP - 1);
        Path::new(OsStr::from_bytes(&self.path[..len]))
    }
}

/// The shared segment: producers' write cursor plus the slot array.
/// Only producers touch `write_index`, and only under the write mutex.
#[repr(C)]
struct RingShared {
    write_index: AtomicU32,
    slots: [FilterRequest; RING_CAP],
}

/// Byte size of the shared segment.
pub const fn ring_segment_size() -> usize {
    std::mem::size_of::<RingShared>()
}

// ---------------------------------------------------------------------------
// Object names
// ---------------------------------------------------------------------------

/// The set of kernel object names one ring instance lives under.
///
/// Production uses the global contract names; tests derive unique sets
/// so concurrent test processes cannot collide.
#[derive(Debug, Clone)]
pub struct RingNames {
    pub shm: String,
    pub empty: String,
    pub full: String,
    pub write: String,
}

impl RingNames {
    /// The service-wide contract names from the `names` module.
    pub fn global() -> Self {
        Self {
            shm: names::SHM_RING.to_string(),
            empty: names::SEM_EMPTY.to_string(),
            full: names::SEM_FULL.to_string(),
            write: names::SEM_WRITE.to_string(),
        }
    }

    /// A private name set under `prefix` (no leading slash).
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            shm: format!("/{prefix}_ring"),
            empty: format!("/{prefix}_empty"),
            full: format!("/{prefix}_full"),
            write: format!("/{prefix}_write"),
        }
    }
}

// ---------------------------------------------------------------------------
// Host (server) side
// ---------------------------------------------------------------------------

/// Server-side ownership of the ring: the shared segment and the three
/// protocol semaphores, all created with exclusive semantics. A
/// creation collision means another server owns the names.
pub struct RingHost {
    names: RingNames,
    shm: PlatformShm,
    empty: PlatformSem,
    full: PlatformSem,
    write: PlatformSem,
}

impl RingHost {
    /// Create the ring segment and semaphores. The segment is sized,
    /// mapped and its write index reset; `empty` starts at `RING_CAP`,
    /// `full` at 0, `write` at 1.
    pub fn create(ring_names: RingNames) -> Result<Self, ServiceError> {
        let already = |name: &str, e: io::Error| {
            if e.raw_os_error() == Some(libc::EEXIST) {
                ServiceError::AlreadyRunning {
                    name: name.to_string(),
                }
            } else {
                ServiceError::Io {
                    context: "create IPC object",
                    source: e,
                }
            }
        };

        // On a partial failure, unlink exactly the names created so far:
        // a crashed half-startup must not wedge the next server, but a
        // collision must never unlink the running owner's objects.
        let shm = PlatformShm::acquire(&ring_names.shm, ring_segment_size(), ShmMode::Create)
            .map_err(|e| already(&ring_names.shm, e))?;
        let write = PlatformSem::create(&ring_names.write, 1).map_err(|e| {
            PlatformShm::unlink_by_name(&ring_names.shm);
            already(&ring_names.write, e)
        })?;
        let empty = PlatformSem::create(&ring_names.empty, RING_CAP as u32).map_err(|e| {
            PlatformShm::unlink_by_name(&ring_names.shm);
            PlatformSem::unlink_by_name(&ring_names.write);
            already(&ring_names.empty, e)
        })?;
        let full = PlatformSem::create(&ring_names.full, 0).map_err(|e| {
            PlatformShm::unlink_by_name(&ring_names.shm);
            PlatformSem::unlink_by_name(&ring_names.write);
            PlatformSem::unlink_by_name(&ring_names.empty);
            already(&ring_names.full, e)
        })?;

        let ring = shm.as_mut_ptr() as *mut RingShared;
        unsafe { (*ring).write_index.store(0, Ordering::Relaxed) };

        Ok(Self {
            names: ring_names,
            shm,
            empty,
            full,
            write,
        })
    }

    /// The `full` semaphore, for the shutdown handler's sentinel post.
    pub fn full_sem(&self) -> &PlatformSem {
        &self.full
    }

    pub fn consumer(&self) -> RingConsumer<'_> {
        RingConsumer {
            shm: &self.shm,
            empty: &self.empty,
            full: &self.full,
            read_index: 0,
        }
    }

    /// Remove every kernel name this host created. Called once on clean
    /// shutdown; open handles (including clients') stay valid until
    /// closed.
    pub fn unlink(&self) {
        PlatformShm::unlink_by_name(&self.names.shm);
        PlatformSem::unlink_by_name(&self.names.empty);
        PlatformSem::unlink_by_name(&self.names.full);
        PlatformSem::unlink_by_name(&self.names.write);
    }
}

// ---------------------------------------------------------------------------
// Consumer (server loop)
// ---------------------------------------------------------------------------

/// Single-consumer view of the ring. The read index lives here, in the
/// server's private memory, never in the shared segment.
pub struct RingConsumer<'a> {
    shm: &'a PlatformShm,
    empty: &'a PlatformSem,
    full: &'a PlatformSem,
    read_index: usize,
}

impl RingConsumer<'_> {
    /// Block until a `full` token is available. `Ok(false)` means a
    /// signal handler interrupted the wait — the caller re-checks its
    /// shutdown/reload flags before waiting again. `Ok(true)` means one
    /// token was consumed; the caller must either `take()` the request
    /// or be shutting down (the shutdown handler posts one sentinel
    /// token precisely so this wait can unblock without a request).
    pub fn wait_request(&self) -> io::Result<bool> {
        self.full.wait_interruptible()
    }

    /// Copy the request at the read position, advance, and hand the
    /// freed slot back to producers. Must follow a successful
    /// `wait_request`.
    pub fn take(&mut self) -> io::Result<FilterRequest> {
        let ring = self.shm.as_mut_ptr() as *const RingShared;
        let request = unsafe { ptr::read(ptr::addr_of!((*ring).slots[self.read_index])) };
        self.read_index = (self.read_index + 1) % RING_CAP;
        self.empty.post()?;
        Ok(request)
    }
}

// ---------------------------------------------------------------------------
// Producer (client) side
// ---------------------------------------------------------------------------

/// Client-side handle: opens the existing ring objects and commits one
/// request. If `empty` does not exist the server is not running and the
/// client fails fast with an actionable message.
pub struct RingProducer {
    shm: PlatformShm,
    empty: PlatformSem,
    full: PlatformSem,
    write: PlatformSem,
}

impl RingProducer {
    pub fn open(ring_names: &RingNames) -> Result<Self, ServiceError> {
        let empty = PlatformSem::open(&ring_names.empty).map_err(|e| {
            if e.raw_os_error() == Some(libc::ENOENT) {
                ServiceError::ServerNotRunning
            } else {
                ServiceError::Io {
                    context: "open empty semaphore",
                    source: e,
                }
            }
        })?;
        let full = PlatformSem::open(&ring_names.full).map_err(ServiceError::io("open full semaphore"))?;
        let write =
            PlatformSem::open(&ring_names.write).map_err(ServiceError::io("open write mutex"))?;
        let shm = PlatformShm::acquire(&ring_names.shm, ring_segment_size(), ShmMode::Open)
            .map_err(ServiceError::io("open request ring"))?;
        Ok(Self {
            shm,
            empty,
            full,
            write,
        })
    }

    /// Commit one request: acquire a free slot, serialise against other
    /// producers, write the slot, advance the cursor, then publish. The
    /// `full` post happens after the mutex release so the consumer
    /// never observes a half-written slot.
    pub fn submit(&self, request: &FilterRequest) -> io::Result<()> {
        self.empty.wait()?;
        self.write.wait()?;

        let ring = self.shm.as_mut_ptr() as *mut RingShared;
        unsafe {
            let idx = (*ring).write_index.load(Ordering::Relaxed) as usize % RING_CAP;
            ptr::write(ptr::addr_of_mut!((*ring).slots[idx]), *request);
            (*ring)
                .write_index
                .store(((idx + 1) % RING_CAP) as u32, Ordering::Relaxed);
        }

        self.write.post()?;
        self.full.post()?;
        Ok(())
    }
}
