// SPDX-License-Identifier: MIT
//
// Client executable: one request, one response, exit 0 on success.

use bmpfilterd::client::{self, Command};

fn main() {
    let argv: Vec<String> = std::env::args().collect();
    let exec_name = argv
        .first()
        .map(String::as_str)
        .unwrap_or("bmp_client")
        .to_string();

    let command = match client::parse_args(&argv[1..]) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{exec_name}: {message}");
            eprint!("{}", client::help_text(&exec_name));
            std::process::exit(1);
        }
    };

    let args = match command {
        Command::Help => {
            print!("{}", client::help_text(&exec_name));
            return;
        }
        Command::Run(args) => args,
    };

    if let Err(err) = client::run(&args) {
        eprintln!("{exec_name}: Error: {err}");
        std::process::exit(1);
    }
}
