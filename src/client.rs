// SPDX-License-Identifier: MIT
//
// The client stub: parse `<input> <output> <filter-flag>`, commit one
// request through the ring, then block on the response FIFO and write
// the filtered image to the output path.
//
// The argument parser and the help text are both derived from the
// filter table, so a filter added there is immediately reachable from
// the command line with no parser change.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use crate::error::{ServiceError, Status};
use crate::fifo::{ResponseFifo, CHUNK_SIZE};
use crate::filters::{spec_by_flag, FilterId, FILTER_TABLE};
use crate::full_io;
use crate::ring::{FilterRequest, RingNames, RingProducer};

/// A parsed invocation.
#[derive(Debug, PartialEq, Eq)]
pub struct Arguments {
    pub input: PathBuf,
    pub output: PathBuf,
    pub filter: FilterId,
}

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Run(Arguments),
    Help,
}

/// Parse `argv[1..]`. Errors carry the message to print before the
/// usage text; nothing is produced on the ring for a bad invocation.
pub fn parse_args(args: &[String]) -> Result<Command, String> {
    if args.iter().any(|a| a == "-h" || a == "--help") {
        return Ok(Command::Help);
    }
    if args.len() != 3 {
        return Err(format!(
            "expected <input> <output> <filter>, got {} argument(s)",
            args.len()
        ));
    }

    let spec =
        spec_by_flag(&args[2]).ok_or_else(|| format!("Unknown filter '{}'", args[2]))?;

    Ok(Command::Run(Arguments {
        input: PathBuf::from(&args[0]),
        output: PathBuf::from(&args[1]),
        filter: spec.id,
    }))
}

/// Render the help text from the filter table, with the flag column
/// aligned to the widest entry.
pub fn help_text(exec_name: &str) -> String {
    let mut flags_width = "-h, --help".len();
    for spec in FILTER_TABLE {
        flags_width = flags_width.max(spec.short_flag.len() + spec.long_flag.len() + 5);
    }

    let mut out = String::new();
    out.push_str("USAGE:\n");
    out.push_str(&format!("\t{exec_name} <input> <output> <filter>\n\n"));
    out.push_str("ARGUMENTS:\n");
    out.push_str(&format!("\t{:flags_width$}\tInput image path\n", "<input>"));
    out.push_str(&format!("\t{:flags_width$}\tOutput image path\n", "<output>"));
    out.push_str("\nOPTIONS:\n");
    out.push_str(&format!(
        "\t{:flags_width$}\tShow this help message\n",
        "-h, --help"
    ));
    for spec in FILTER_TABLE {
        let flags = format!("-{}, --{}", spec.short_flag, spec.long_flag);
        out.push_str(&format!("\t{flags:flags_width$}\t{}\n", spec.description));
    }
    out
}

/// Submit the request and collect the response. Returns once the
/// output file holds the filtered image.
pub fn run(args: &Arguments) -> Result<(), ServiceError> {
    let client_id = unsafe { libc::getpid() };
    let request = FilterRequest::new(client_id, &args.input, args.filter)?;

    // Fast-fail path: opening `empty` tells us whether a server owns
    // the IPC names at all.
    let producer = RingProducer::open(&RingNames::global())?;

    // The FIFO must exist before the request is visible, so the worker
    // always finds it ready.
    let fifo = ResponseFifo::create(client_id).map_err(ServiceError::io("create response FIFO"))?;

    producer
        .submit(&request)
        .map_err(ServiceError::io("submit request"))?;

    // Blocks until the worker opens its end.
    let reader = fifo
        .open_reader()
        .map_err(ServiceError::io("open response FIFO"))?;

    let status = ResponseFifo::read_status(&reader)
        .map_err(ServiceError::io("read response status"))?;
    if status != Status::Ok {
        return Err(ServiceError::Rejected(status));
    }

    // Filters preserve byte length, so the input size is the response
    // body length.
    let expected = std::fs::metadata(&args.input)
        .map_err(ServiceError::io("stat input file"))?
        .len() as usize;

    let mut output = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o666)
        .open(&args.output)
        .map_err(ServiceError::io("create output file"))?;

    let mut remaining = expected;
    let mut buf = vec![0u8; CHUNK_SIZE];
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE);
        let got = full_io::full_read(reader.as_raw_fd(), &mut buf[..want])
            .map_err(ServiceError::io("read response image"))?;
        if got == 0 {
            return Err(ServiceError::Io {
                context: "read response image",
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("worker closed the FIFO with {remaining} bytes outstanding"),
                ),
            });
        }
        output
            .write_all(&buf[..got])
            .map_err(ServiceError::io("write output file"))?;
        remaining -= got;
    }
    output.flush().map_err(ServiceError::io("flush output file"))?;

    // `fifo` drops here and unlinks its path.
    Ok(())
}
