//! Larder - file-backed JSON storage for content sites

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = larder::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
