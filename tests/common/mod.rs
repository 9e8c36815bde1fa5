// SPDX-License-Identifier: MIT
//
// Shared fixtures: synthetic 24-bit BMPs written to temp files.
// Not every test binary uses every helper.
#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use bmpfilterd::bmp::{row_stride, BMP_SIGNATURE, DIB_HEADER_SIZE, FILE_HEADER_SIZE};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A kernel-object name prefix no other test process will use.
pub fn unique_prefix(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("bmpd_test_{tag}_{}_{n}", std::process::id())
}

/// Build a 24-bit uncompressed BMP. `height` may be negative for
/// top-down row order; `pixel` maps `(x, row)` in array order to a BGR
/// triple.
pub fn build_bmp(width: i32, height: i32, mut pixel: impl FnMut(i32, i32) -> [u8; 3]) -> Vec<u8> {
    let stride = row_stride(width);
    let rows = height.unsigned_abs() as usize;
    let pixel_bytes = stride * rows;
    let file_size = FILE_HEADER_SIZE + DIB_HEADER_SIZE + pixel_bytes;

    let mut out = Vec::with_capacity(file_size);
    out.extend_from_slice(&BMP_SIGNATURE.to_le_bytes());
    out.extend_from_slice(&(file_size as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 4]); // reserved fields
    out.extend_from_slice(&((FILE_HEADER_SIZE + DIB_HEADER_SIZE) as u32).to_le_bytes());

    out.extend_from_slice(&(DIB_HEADER_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // planes
    out.extend_from_slice(&24u16.to_le_bytes()); // bit count
    out.extend_from_slice(&0u32.to_le_bytes()); // compression
    out.extend_from_slice(&(pixel_bytes as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 16]); // resolution + palette fields

    for row in 0..rows as i32 {
        let mut written = 0usize;
        for x in 0..width {
            out.extend_from_slice(&pixel(x, row));
            written += 3;
        }
        out.resize(out.len() + (stride - written), 0);
    }
    out
}

/// Write a BMP to a temp file and return the handle (the file lives as
/// long as the handle).
pub fn bmp_file(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(bytes).expect("write bmp");
    file.flush().expect("flush bmp");
    file
}

/// The pixel-array region of a BMP byte vector.
pub fn pixel_array(bytes: &[u8]) -> &[u8] {
    &bytes[FILE_HEADER_SIZE + DIB_HEADER_SIZE..]
}
