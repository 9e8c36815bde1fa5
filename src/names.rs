// SPDX-License-Identifier: MIT
//
// The shared client/server contract: IPC object names, ring geometry and
// protocol limits. Both binaries link this module; changing any value
// here is a wire-protocol break.

/// Number of request slots in the shared ring.
pub const RING_CAP: usize = 10;

/// Fixed byte capacity of the request path field (zero-padded).
pub const PATH_CAP: usize = 4096;

/// Largest input file a worker will accept.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Per-chunk FIFO write timeout in the worker.
pub const WRITE_TIMEOUT_SECS: u32 = 5;

/// Shared-memory object holding the request ring.
pub const SHM_RING: &str = "/filter_request_fifo";

/// Counting semaphore: free ring slots. Initial value `RING_CAP`.
pub const SEM_EMPTY: &str = "/mutex_empty";

/// Counting semaphore: pending requests. Initial value 0.
pub const SEM_FULL: &str = "/mutex_full";

/// Binary semaphore serialising producers around `write_index`.
pub const SEM_WRITE: &str = "/mutex_write";

/// Counting semaphore: worker admission tokens. Initial value
/// `max_workers`, resized on configuration reload.
pub const SEM_WORKERS: &str = "/mutex_worker_count";

/// Binary semaphore guarding the server configuration record.
pub const SEM_CONFIG: &str = "/mutex_bmp_config";

/// Per-client response FIFO path prefix; the client pid is appended.
pub const FIFO_RESPONSE_BASE: &str = "/tmp/fifo_rep_";

/// Server pid file.
pub const PID_FILE: &str = "/tmp/bmp_server.pid";

/// Configuration file search order: working directory first, then the
/// system location, then built-in defaults.
pub const CONFIG_PATH_LOCAL: &str = "./bmp_server.conf";
pub const CONFIG_PATH_SYSTEM: &str = "/etc/bmp_server.conf";

/// Response FIFO path for a given client id.
pub fn response_fifo_path(client_id: i32) -> String {
    format!("{FIFO_RESPONSE_BASE}{client_id}")
}
