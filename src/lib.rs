// SPDX-License-Identifier: MIT
//
// bmpfilterd — a long-running local image-filtering service.
//
// Short-lived clients push fixed-size requests through a shared-memory
// ring guarded by named POSIX semaphores; the server admits a bounded
// number of forked workers; each worker maps the BMP privately, applies
// the requested filter with a row-partitioned thread pool, and streams
// the result back over a per-request FIFO.

mod platform;
pub use platform::{PlatformSem, PlatformShm, ShmMode};

pub mod names;

pub mod error;
pub use error::{ServiceError, Status};

pub mod full_io;

pub mod ring;
pub use ring::{FilterRequest, RingConsumer, RingProducer};

pub mod fifo;
pub use fifo::ResponseFifo;

pub mod bmp;
pub use bmp::MappedImage;

pub mod filters;
pub use filters::{FilterId, FilterKind, FilterSpec, FILTER_TABLE};

pub mod config;
pub use config::ServerConfig;

pub mod logging;

pub mod daemon;

pub mod server;

pub mod worker;

pub mod client;
