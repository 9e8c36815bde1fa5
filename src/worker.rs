// SPDX-License-Identifier: MIT
//
// The per-request worker, run in the child the server forks for every
// accepted request. It opens the client's response FIFO, maps the
// input privately, applies the requested filter across a pool of
// threads partitioned by horizontal stripes, and streams the mutated
// mapping back. Every failure after the FIFO is open is reported as a
// status word; every exit path releases the mapping, the reference
// allocation and the alarm.

use std::ops::Range;

use tracing::{debug, error};

use crate::bmp::MappedImage;
use crate::config::ServerConfig;
use crate::error::{ServiceError, Status};
use crate::fifo::{self, ResponseWriter};
use crate::filters::{FilterId, FilterKind, FilterSpec, Stripe};
use crate::names::MAX_FILE_SIZE;
use crate::platform::PlatformSem;
use crate::ring::FilterRequest;

/// Worker entry point in the forked child. Returns the process exit
/// code. The configuration record is the fork-time snapshot; its
/// thread bounds are read under the named config mutex, mirroring the
/// reload handler's writes on the server side.
pub fn run(request: &FilterRequest, config: &ServerConfig, config_mutex: &PlatformSem) -> i32 {
    if let Err(err) = fifo::install_write_timeout_handler() {
        error!(%err, "worker could not install its write timeout");
        return 1;
    }

    // Without the FIFO there is no channel to report anything on.
    let mut writer = match ResponseWriter::open(request.client_id) {
        Ok(writer) => writer,
        Err(err) => {
            error!(client = request.client_id, %err, "response FIFO unavailable");
            return 1;
        }
    };

    match process(request, config, config_mutex, &mut writer) {
        Ok(()) => 0,
        Err(err) => {
            error!(client = request.client_id, %err, "request failed");
            let status = err.status();
            if let Err(err) = writer.send_status(status) {
                error!(client = request.client_id, %err, "could not deliver error status");
            }
            1
        }
    }
}

fn process(
    request: &FilterRequest,
    config: &ServerConfig,
    config_mutex: &PlatformSem,
    writer: &mut ResponseWriter,
) -> Result<(), ServiceError> {
    let path = request.path();

    let metadata = std::fs::metadata(path).map_err(ServiceError::io("stat input file"))?;
    if metadata.len() > MAX_FILE_SIZE {
        return Err(ServiceError::FileTooLarge {
            size: metadata.len(),
            limit: MAX_FILE_SIZE,
        });
    }

    let mut image = MappedImage::map(path)?;

    let spec = FilterId::from_ordinal(request.filter)
        .ok_or(ServiceError::UnknownFilter(request.filter))?
        .spec();

    let thread_count = {
        config_mutex
            .wait()
            .map_err(ServiceError::io("lock config mutex"))?;
        let snapshot = *config;
        config_mutex
            .post()
            .map_err(ServiceError::io("unlock config mutex"))?;
        snapshot.thread_count(metadata.len())
    };

    debug!(
        client = request.client_id,
        filter = spec.long_flag,
        threads = thread_count,
        "filtering"
    );
    apply_filter(&mut image, spec, thread_count);

    let timeout_or = |context: &'static str| {
        move |e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                ServiceError::WriteTimeout
            } else {
                ServiceError::Io { context, source: e }
            }
        }
    };
    writer
        .send_status(Status::Ok)
        .map_err(timeout_or("write response status"))?;
    writer
        .send_image(image.as_bytes())
        .map_err(timeout_or("write response image"))?;
    Ok(())
}

/// Apply `spec` to the whole image using `thread_count` threads, each
/// owning a disjoint stripe of rows. Convolution-family filters get a
/// shared read-only copy of the pre-filter pixel array; joining the
/// scope is the only synchronisation.
pub fn apply_filter(image: &mut MappedImage, spec: &'static FilterSpec, thread_count: u32) {
    let width = image.width();
    let height = image.abs_height();
    let stride = image.stride();

    let reference: Option<Vec<u8>> =
        (spec.kind == FilterKind::Convolution).then(|| image.pixels().to_vec());

    let ranges = partition_rows(height, thread_count);
    let mut rest = image.pixels_mut();

    std::thread::scope(|scope| {
        for range in ranges {
            let rows = (range.end - range.start) as usize;
            let (stripe_out, tail) = std::mem::take(&mut rest).split_at_mut(rows * stride);
            rest = tail;
            let reference = reference.as_deref();
            let start_row = range.start;
            scope.spawn(move || {
                let mut stripe = Stripe {
                    out: stripe_out,
                    start_row,
                    width,
                    height,
                    stride,
                    reference,
                };
                (spec.run)(&mut stripe);
            });
        }
    });
}

/// Split `height` rows into `n` contiguous ranges whose sizes differ by
/// at most one, earlier ranges taking the remainder. Tolerates
/// `n > height` by producing empty ranges.
pub fn partition_rows(height: i32, n: u32) -> Vec<Range<i32>> {
    let n = n.max(1) as i32;
    let base = height / n;
    let remainder = height % n;
    let mut ranges = Vec::with_capacity(n as usize);
    let mut start = 0;
    for i in 0..n {
        let size = base + i32::from(i < remainder);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}
