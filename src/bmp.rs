// SPDX-License-Identifier: MIT
//
// BMP consumption, to the extent the filter engine needs it: the packed
// 14-byte file header, the 40-byte DIB header, and the 24-bit packed
// BGR pixel array with rows padded to 4-byte boundaries.
//
// The worker maps the input MAP_PRIVATE with PROT_READ|PROT_WRITE, so
// filters mutate an anonymous copy-on-write view and the file on disk
// is never touched.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr;

use crate::error::ServiceError;

/// "BM", little-endian.
pub const BMP_SIGNATURE: u16 = 0x4D42;

pub const FILE_HEADER_SIZE: usize = 14;
pub const DIB_HEADER_SIZE: usize = 40;

/// Byte distance between the starts of two adjacent pixel rows.
pub fn row_stride(width: i32) -> usize {
    ((width as usize * 3 + 3) / 4) * 4
}

/// The packed BITMAPFILEHEADER fields the service consumes.
#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub signature: u16,
    pub file_size: u32,
    pub pixel_array_offset: u32,
}

impl FileHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, ServiceError> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(ServiceError::InvalidImage("file shorter than a BMP header"));
        }
        Ok(Self {
            signature: u16::from_le_bytes([bytes[0], bytes[1]]),
            file_size: u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
            pixel_array_offset: u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]),
        })
    }
}

/// The BITMAPINFOHEADER fields the service consumes. `height` keeps its
/// sign: positive means bottom-up rows, negative top-down.
#[derive(Debug, Clone, Copy)]
pub struct DibHeader {
    pub header_size: u32,
    pub width: i32,
    pub height: i32,
    pub planes: u16,
    pub bit_count: u16,
    pub compression: u32,
}

impl DibHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, ServiceError> {
        if bytes.len() < FILE_HEADER_SIZE + DIB_HEADER_SIZE {
            return Err(ServiceError::InvalidImage("file shorter than the DIB header"));
        }
        let at = |off: usize| -> [u8; 4] {
            let o = FILE_HEADER_SIZE + off;
            [bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]]
        };
        let at2 = |off: usize| -> [u8; 2] {
            let o = FILE_HEADER_SIZE + off;
            [bytes[o], bytes[o + 1]]
        };
        Ok(Self {
            header_size: u32::from_le_bytes(at(0)),
            width: i32::from_le_bytes(at(4)),
            height: i32::from_le_bytes(at(8)),
            planes: u16::from_le_bytes(at2(12)),
            bit_count: u16::from_le_bytes(at2(14)),
            compression: u32::from_le_bytes(at(16)),
        })
    }
}

/// A BMP input mapped privately into the worker.
pub struct MappedImage {
    mem: *mut u8,
    len: usize,
    file_header: FileHeader,
    dib: DibHeader,
}

// The mapping is private to this process; `&mut self` discipline on the
// mutators keeps aliasing sane across the filter threads.
unsafe impl Send for MappedImage {}
unsafe impl Sync for MappedImage {}

impl MappedImage {
    /// Map `path` and validate the headers against what the filter
    /// engine supports (24-bit uncompressed BGR, sane pixel-array
    /// bounds).
    pub fn map(path: &Path) -> Result<Self, ServiceError> {
        let file = File::open(path).map_err(ServiceError::io("open input file"))?;
        let len = file
            .metadata()
            .map_err(ServiceError::io("stat input file"))?
            .len() as usize;
        if len < FILE_HEADER_SIZE + DIB_HEADER_SIZE {
            return Err(ServiceError::InvalidImage("file shorter than the BMP headers"));
        }

        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };
        if mem == libc::MAP_FAILED {
            return Err(ServiceError::Io {
                context: "mmap input file",
                source: io::Error::last_os_error(),
            });
        }

        // Construct before parsing so the mapping is released on every
        // error path; the headers are patched in once readable.
        let mut image = Self {
            mem: mem as *mut u8,
            len,
            file_header: FileHeader {
                signature: 0,
                file_size: 0,
                pixel_array_offset: 0,
            },
            dib: DibHeader {
                header_size: 0,
                width: 0,
                height: 0,
                planes: 0,
                bit_count: 0,
                compression: 0,
            },
        };

        let (file_header, dib) = {
            let bytes = image.as_bytes();
            (FileHeader::parse(bytes)?, DibHeader::parse(bytes)?)
        };
        image.file_header = file_header;
        image.dib = dib;
        image.validate()?;
        Ok(image)
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.file_header.signature != BMP_SIGNATURE {
            return Err(ServiceError::InvalidImage("bad BMP signature"));
        }
        if self.dib.bit_count != 24 {
            return Err(ServiceError::InvalidImage("only 24-bit BMPs are supported"));
        }
        if self.dib.compression != 0 {
            return Err(ServiceError::InvalidImage("compressed BMPs are not supported"));
        }
        if self.dib.width <= 0 || self.dib.height == 0 {
            return Err(ServiceError::InvalidImage("degenerate image dimensions"));
        }
        let offset = self.file_header.pixel_array_offset as usize;
        let pixel_bytes = row_stride(self.dib.width) * self.abs_height() as usize;
        if offset < FILE_HEADER_SIZE + DIB_HEADER_SIZE
            || offset.checked_add(pixel_bytes).map_or(true, |end| end > self.len)
        {
            return Err(ServiceError::InvalidImage("pixel array exceeds the file"));
        }
        Ok(())
    }

    pub fn dib(&self) -> &DibHeader {
        &self.dib
    }

    pub fn width(&self) -> i32 {
        self.dib.width
    }

    /// Row count regardless of bottom-up/top-down orientation.
    pub fn abs_height(&self) -> i32 {
        self.dib.height.unsigned_abs() as i32
    }

    pub fn stride(&self) -> usize {
        row_stride(self.dib.width)
    }

    /// The whole mapping, headers included — what the worker streams
    /// back after filtering.
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.mem, self.len) }
    }

    /// The pixel array.
    pub fn pixels(&self) -> &[u8] {
        let offset = self.file_header.pixel_array_offset as usize;
        let bytes = self.stride() * self.abs_height() as usize;
        &self.as_bytes()[offset..offset + bytes]
    }

    /// Mutable pixel array.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        let offset = self.file_header.pixel_array_offset as usize;
        let bytes = self.stride() * self.abs_height() as usize;
        unsafe { std::slice::from_raw_parts_mut(self.mem.add(offset), bytes) }
    }
}

impl Drop for MappedImage {
    fn drop(&mut self) {
        if !self.mem.is_null() {
            unsafe { libc::munmap(self.mem as *mut libc::c_void, self.len) };
        }
    }
}
