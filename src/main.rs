use std::process::ExitCode;

use clap::Parser;
use ctxprobe_lib::cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match ctxprobe_lib::run(&cli) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
