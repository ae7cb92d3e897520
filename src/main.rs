use log::error;
use snafu::ErrorCompat;

mod args;
mod ingest;

use clap::Parser;

fn main() {
    let args = args::Args::parse();

    // RUST_LOG takes precedence over --verbose.
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = ingest::run_command(&args) {
        error!("Error occurred {:?}", e);
        eprintln!("An error occurred {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
