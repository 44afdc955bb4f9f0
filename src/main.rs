//! vdf - literate-programming document engine for HDL sources

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = vdf::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
