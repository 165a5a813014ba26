mod app;
mod import;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tlbscope::importer::diagnostics::Diagnostic;

use crate::app::Cli;

fn main() -> ExitCode {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // tlbscope info+ on stderr; --verbose enables debug; RUST_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("tlbscope", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    match import::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => match error.downcast_ref::<tlbscope::Error>() {
            Some(cause) => {
                eprintln!("{}", Diagnostic::from_error(cause));
                ExitCode::from(exit_status(cause.exit_code()))
            }
            None => {
                eprintln!("error: {error:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
