// SPDX-License-Identifier: MIT
//
// Platform layer. The service is POSIX-only: shm_open segments, sem_open
// semaphores, mkfifo pipes and forked workers have no portable rendition.

#[cfg(unix)]
pub mod posix;

#[cfg(unix)]
pub use posix::{PlatformSem, PlatformShm, ShmMode};

#[cfg(not(unix))]
compile_error!("bmpfilterd requires a POSIX platform (shm_open/sem_open/mkfifo/fork)");
