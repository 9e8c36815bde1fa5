// SPDX-License-Identifier: MIT
//
// End-to-end filter engine tests over real mapped files, plus a worker
// round-trip through a response FIFO. The input files on disk must
// never change: the worker's mapping is private.

mod common;

use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::thread;

use bmpfilterd::error::Status;
use bmpfilterd::fifo::ResponseFifo;
use bmpfilterd::full_io;
use bmpfilterd::names::MAX_FILE_SIZE;
use bmpfilterd::ring::FilterRequest;
use bmpfilterd::worker::{self, apply_filter};
use bmpfilterd::{FilterId, MappedImage, PlatformSem, ServerConfig};

fn filter_file(path: &Path, filter: FilterId, threads: u32) -> Vec<u8> {
    let mut image = MappedImage::map(path).expect("map");
    apply_filter(&mut image, filter.spec(), threads);
    image.as_bytes().to_vec()
}

#[test]
fn identity_is_bitwise() {
    let bytes = common::build_bmp(5, 4, |x, row| [x as u8, row as u8, 200]);
    let file = common::bmp_file(&bytes);
    let out = filter_file(file.path(), FilterId::Identity, 3);
    assert_eq!(out, bytes);
}

#[test]
fn invert_matches_the_reference_pixels() {
    // 2x2: red, green, blue, white (BGR byte order in the array).
    let px = [
        [[0u8, 0, 255], [0, 255, 0]],
        [[255, 0, 0], [255, 255, 255]],
    ];
    let bytes = common::build_bmp(2, 2, |x, row| px[row as usize][x as usize]);
    let file = common::bmp_file(&bytes);

    let out = filter_file(file.path(), FilterId::Invert, 2);
    let expect = [
        [[255u8, 255, 0], [255, 0, 255]],
        [[0, 255, 255], [0, 0, 0]],
    ];
    let pixels = common::pixel_array(&out);
    for row in 0..2usize {
        for x in 0..2usize {
            assert_eq!(&pixels[row * 8 + x * 3..row * 8 + x * 3 + 3], expect[row][x]);
        }
    }
    // Same byte length, headers untouched.
    assert_eq!(out.len(), bytes.len());
    assert_eq!(out[..54], bytes[..54]);
}

#[test]
fn invert_twice_restores_the_original() {
    let bytes = common::build_bmp(7, 5, |x, row| {
        [(x * 31) as u8, (row * 47) as u8, (x + row) as u8]
    });
    let file = common::bmp_file(&bytes);

    let once = filter_file(file.path(), FilterId::Invert, 4);
    assert_ne!(once, bytes);

    let file_once = common::bmp_file(&once);
    let twice = filter_file(file_once.path(), FilterId::Invert, 4);
    assert_eq!(twice, bytes);
}

#[test]
fn box_blur_keeps_solid_grey_exact() {
    let bytes = common::build_bmp(4, 4, |_, _| [128, 128, 128]);
    let file = common::bmp_file(&bytes);
    let out = filter_file(file.path(), FilterId::Blur, 2);
    let pixels = common::pixel_array(&out);
    assert!(pixels.iter().all(|&v| v == 128));
}

#[test]
fn top_down_images_filter_like_bottom_up() {
    let pixel = |x: i32, row: i32| [(x * 10) as u8, (row * 10) as u8, 77];
    let bottom_up = common::bmp_file(&common::build_bmp(6, 6, pixel));
    let top_down = common::bmp_file(&common::build_bmp(6, -6, pixel));

    let out_bu = filter_file(bottom_up.path(), FilterId::GaussianBlur, 3);
    let out_td = filter_file(top_down.path(), FilterId::GaussianBlur, 3);

    // Identical array-order bytes in, identical array-order bytes out;
    // orientation only changes the header's sign.
    assert_eq!(common::pixel_array(&out_bu), common::pixel_array(&out_td));
}

#[test]
fn more_threads_than_rows_is_harmless() {
    let bytes = common::build_bmp(3, 2, |x, row| [x as u8, row as u8, 9]);
    let file = common::bmp_file(&bytes);

    let few = filter_file(file.path(), FilterId::GaussianBlur, 1);
    let many = filter_file(file.path(), FilterId::GaussianBlur, 8);
    assert_eq!(few, many);
}

#[test]
fn convolution_is_deterministic_across_partitions() {
    let bytes = common::build_bmp(9, 7, |x, row| {
        [(x * x) as u8, (row * 13) as u8, (x * row) as u8]
    });
    let file = common::bmp_file(&bytes);

    let reference = filter_file(file.path(), FilterId::EdgeDetect, 1);
    for threads in [2, 3, 7] {
        assert_eq!(filter_file(file.path(), FilterId::EdgeDetect, threads), reference);
    }
}

#[test]
fn every_filter_runs_on_a_small_image() {
    let bytes = common::build_bmp(8, 6, |x, row| [(x * 20) as u8, (row * 30) as u8, 100]);
    let file = common::bmp_file(&bytes);

    for spec in bmpfilterd::FILTER_TABLE {
        let out = filter_file(file.path(), spec.id, 3);
        assert_eq!(out.len(), bytes.len(), "{}", spec.long_flag);
    }
}

#[test]
fn the_input_file_on_disk_is_never_modified() {
    let bytes = common::build_bmp(4, 4, |x, row| [x as u8, row as u8, 50]);
    let file = common::bmp_file(&bytes);
    let _ = filter_file(file.path(), FilterId::Invert, 2);
    assert_eq!(std::fs::read(file.path()).unwrap(), bytes);
}

// ---------------------------------------------------------------------------
// Worker round-trip over a real FIFO
// ---------------------------------------------------------------------------

/// Run the worker in a thread against a client-side FIFO and return
/// (status, body).
fn worker_roundtrip(client_id: i32, request: FilterRequest, expected_len: usize) -> (Status, Vec<u8>) {
    let prefix = common::unique_prefix("cfgmx");
    let config_mutex = PlatformSem::create(&format!("/{prefix}"), 1).expect("config mutex");
    let config = ServerConfig::default();

    let fifo = ResponseFifo::create(client_id).expect("create fifo");

    let worker_thread = thread::spawn(move || worker::run(&request, &config, &config_mutex));

    let reader = fifo.open_reader().expect("open reader");
    let status = ResponseFifo::read_status(&reader).expect("status");

    let mut body = vec![0u8; expected_len];
    let got = full_io::full_read(reader.as_raw_fd(), &mut body).expect("body");
    body.truncate(got);

    worker_thread.join().unwrap();
    PlatformSem::unlink_by_name(&format!("/{prefix}"));
    (status, body)
}

#[test]
fn worker_streams_the_filtered_image() {
    let bytes = common::build_bmp(4, 3, |x, row| [(x * 40) as u8, (row * 60) as u8, 10]);
    let file = common::bmp_file(&bytes);
    let client_id = 100_000 + std::process::id() as i32;

    let request = FilterRequest::new(client_id, file.path(), FilterId::Invert).unwrap();
    let (status, body) = worker_roundtrip(client_id, request, bytes.len() + 64);

    assert_eq!(status, Status::Ok);
    assert_eq!(body.len(), bytes.len(), "filters preserve byte length");
    for (out, orig) in common::pixel_array(&body)
        .iter()
        .zip(common::pixel_array(&bytes))
    {
        assert_eq!(*out, 255 - orig);
    }
}

#[test]
fn worker_reports_missing_input() {
    let client_id = 200_000 + std::process::id() as i32;
    let request = FilterRequest::new(
        client_id,
        Path::new("/nonexistent/missing.bmp"),
        FilterId::Blur,
    )
    .unwrap();
    let (status, body) = worker_roundtrip(client_id, request, 64);
    assert_eq!(status, Status::NotFound);
    assert!(body.is_empty(), "error responses carry no body");
}

#[test]
fn worker_rejects_oversized_input() {
    let file = tempfile::NamedTempFile::new().unwrap();
    // Sparse file: one byte over the limit without writing 100 MB.
    file.as_file().set_len(MAX_FILE_SIZE + 1).unwrap();

    let client_id = 300_000 + std::process::id() as i32;
    let request = FilterRequest::new(client_id, file.path(), FilterId::Identity).unwrap();
    let (status, body) = worker_roundtrip(client_id, request, 64);
    assert_eq!(status, Status::FileTooLarge);
    assert!(body.is_empty());
}

#[test]
fn worker_rejects_an_unknown_filter_ordinal() {
    let bytes = common::build_bmp(2, 2, |_, _| [1, 2, 3]);
    let file = common::bmp_file(&bytes);

    let client_id = 400_000 + std::process::id() as i32;
    let mut request = FilterRequest::new(client_id, file.path(), FilterId::Identity).unwrap();
    request.filter = 9999;
    let (status, body) = worker_roundtrip(client_id, request, 64);
    assert_eq!(status, Status::InvalidArgument);
    assert!(body.is_empty());
}

#[test]
fn worker_rejects_a_non_bmp_file() {
    let file = common::bmp_file(b"definitely not a bitmap, just text");
    let client_id = 500_000 + std::process::id() as i32;
    let request = FilterRequest::new(client_id, file.path(), FilterId::Blur).unwrap();
    let (status, _) = worker_roundtrip(client_id, request, 64);
    assert_eq!(status, Status::InvalidArgument);
}

#[test]
fn oversize_boundary_is_exact() {
    let file = tempfile::NamedTempFile::new().unwrap();
    file.as_file().set_len(MAX_FILE_SIZE).unwrap();
    // Exactly at the limit the size gate passes; the header check then
    // rejects the zero-filled content.
    let client_id = 600_000 + std::process::id() as i32;
    let request = FilterRequest::new(client_id, file.path(), FilterId::Identity).unwrap();
    let (status, _) = worker_roundtrip(client_id, request, 64);
    assert_eq!(status, Status::InvalidArgument);
}
