//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `recordkit_core` linkage with deterministic output.
//! - Print the live schema of the configured store (`schema` subcommand).

use log::error;
use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(err) = recordkit_core::init_logging(recordkit_core::default_log_level(), None) {
        eprintln!("logging disabled: {err}");
    }

    match std::env::args().nth(1).as_deref() {
        None => {
            println!("recordkit_core ping={}", recordkit_core::ping());
            println!("recordkit_core version={}", recordkit_core::core_version());
            ExitCode::SUCCESS
        }
        Some("schema") => print_schema(),
        Some(other) => {
            eprintln!("unknown command `{other}`; usage: recordkit_cli [schema]");
            ExitCode::from(2)
        }
    }
}

fn print_schema() -> ExitCode {
    let report = recordkit_core::shared_engine(None).and_then(|engine| engine.schema());
    match report {
        Ok(report) => {
            print!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_schema module=cli status=error error={}", err);
            eprintln!("schema failed: {err}");
            ExitCode::FAILURE
        }
    }
}
