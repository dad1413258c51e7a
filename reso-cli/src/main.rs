use clap::Parser;
use colored::*;
use log::debug;

use reso_cli::cli::commands::replicate::handle_replicate_command;
use reso_cli::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
    debug!("Starting reso-cli {}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Commands::Replicate(args) => handle_replicate_command(args).await,
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".bright_red().bold(), e);
        std::process::exit(1);
    }
}
