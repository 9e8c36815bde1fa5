// SPDX-License-Identifier: MIT
//
// Server executable. `-f`/`--foreground` keeps the process attached to
// the terminal with stderr logging; otherwise it daemonises and logs
// through syslog.

use bmpfilterd::{daemon, logging, server::Server};

fn main() {
    let mut foreground = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-f" | "--foreground" => foreground = true,
            "-h" | "--help" => {
                println!("usage: bmp_server [-f|--foreground]");
                return;
            }
            other => {
                eprintln!("bmp_server: unknown option '{other}'");
                eprintln!("usage: bmp_server [-f|--foreground]");
                std::process::exit(1);
            }
        }
    }

    if foreground {
        logging::init_foreground();
    } else {
        if let Err(err) = daemon::daemonize() {
            eprintln!("bmp_server: failed to daemonise: {err}");
            std::process::exit(1);
        }
        logging::init_daemon();
    }

    let mut server = match Server::start() {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(%err, "startup failed");
            if foreground {
                eprintln!("bmp_server: {err}");
            }
            std::process::exit(1);
        }
    };

    if let Err(err) = server.run() {
        tracing::error!(%err, "dispatch loop failed");
        drop(server);
        std::process::exit(1);
    }
}
