use std::process::ExitCode;

use clap::Parser;

use epigimp::cli::{self, CliArgs};
use epigimp::logger;

fn main() -> ExitCode {
    logger::init();

    let args = CliArgs::parse();
    if args.verbose
        && let Some(path) = logger::log_path()
    {
        println!("log: {}", path.display());
    }
    cli::run(args)
}
