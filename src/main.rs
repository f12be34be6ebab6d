//! delve-rs CLI entry point.

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use delve_rs::cli::{Cli, execute};
use delve_rs::telemetry::{self, LogOptions};

fn main() -> ExitCode {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    telemetry::init(LogOptions {
        verbose: cli.verbose,
        json: cli.log_json,
    });

    match execute(&cli) {
        Ok(output) => {
            if !output.is_empty() {
                let _ = write!(std::io::stdout(), "{output}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let _ = writeln!(std::io::stderr(), "Error: {e}");
            ExitCode::FAILURE
        }
    }
}
