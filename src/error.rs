// SPDX-License-Identifier: MIT
//
// Error surface of the service and the wire status catalogue.
//
// The status word is the first four bytes (LE) of every FIFO response.
// Non-zero values are errno equivalents so the catalogue stays readable
// in strace output; unknown values decode as `Internal` so the set can
// grow without breaking old clients.

use std::io;

use thiserror::Error;

/// Wire status catalogue carried to the client as a 4-byte LE word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    InvalidArgument,
    FileTooLarge,
    IoError,
    NotFound,
    PermissionDenied,
    Internal,
}

impl Status {
    /// Encode to the wire value.
    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::InvalidArgument => libc::EINVAL,
            Status::FileTooLarge => libc::EFBIG,
            Status::IoError => libc::EIO,
            Status::NotFound => libc::ENOENT,
            Status::PermissionDenied => libc::EACCES,
            Status::Internal => libc::ENOTRECOVERABLE,
        }
    }

    /// Decode a wire value. Anything outside the catalogue is `Internal`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Status::Ok,
            c if c == libc::EINVAL => Status::InvalidArgument,
            c if c == libc::EFBIG => Status::FileTooLarge,
            c if c == libc::EIO => Status::IoError,
            c if c == libc::ENOENT => Status::NotFound,
            c if c == libc::EACCES => Status::PermissionDenied,
            _ => Status::Internal,
        }
    }

    /// Human message the client prints for a failed request.
    pub fn message(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::InvalidArgument => "invalid argument (not a 24-bit uncompressed BMP?)",
            Status::FileTooLarge => "input file exceeds the size limit",
            Status::IoError => "I/O error while processing the image",
            Status::NotFound => "input file not found",
            Status::PermissionDenied => "permission denied",
            Status::Internal => "internal server error",
        }
    }

    pub fn to_le_bytes(self) -> [u8; 4] {
        self.code().to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Self::from_code(i32::from_le_bytes(bytes))
    }
}

/// Errors raised inside the server, the worker and the client stub.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The client could not find the server's IPC objects.
    #[error("Server is not running. Please start the server first.")]
    ServerNotRunning,

    /// Exclusive creation of an IPC object collided at startup.
    #[error("server already running (IPC name {name} is taken)")]
    AlreadyRunning { name: String },

    /// The mapped file is not an image this service understands.
    #[error("invalid image: {0}")]
    InvalidImage(&'static str),

    #[error("file too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    /// A request carried a filter ordinal outside the table.
    #[error("unknown filter ordinal {0}")]
    UnknownFilter(u32),

    /// The per-chunk response write alarm fired.
    #[error("response write timed out (client gone?)")]
    WriteTimeout,

    /// The worker answered with a non-zero status word.
    #[error("server rejected the request: {}", .0.message())]
    Rejected(Status),

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ServiceError {
    /// Attach a call-site context to an `io::Error`.
    pub fn io(context: &'static str) -> impl FnOnce(io::Error) -> ServiceError {
        move |source| ServiceError::Io { context, source }
    }

    /// The status word a worker reports for this failure.
    pub fn status(&self) -> Status {
        match self {
            ServiceError::InvalidImage(_) | ServiceError::UnknownFilter(_) => {
                Status::InvalidArgument
            }
            ServiceError::FileTooLarge { .. } => Status::FileTooLarge,
            ServiceError::WriteTimeout => Status::IoError,
            ServiceError::Rejected(status) => *status,
            ServiceError::Io { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => Status::NotFound,
                io::ErrorKind::PermissionDenied => Status::PermissionDenied,
                _ => Status::IoError,
            },
            ServiceError::ServerNotRunning | ServiceError::AlreadyRunning { .. } => {
                Status::Internal
            }
        }
    }
}
