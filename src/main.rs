// src/main.rs

use clap::Parser;

use shipd::cli::CliArgs;
use shipd::logging::init_logging;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    if let Err(e) = init_logging(args.log_level) {
        eprintln!("failed to initialise logging: {e}");
        std::process::exit(2);
    }

    if let Err(e) = shipd::run(args).await {
        tracing::error!(error = %e, "shipd exited with an error");
        std::process::exit(1);
    }
}
