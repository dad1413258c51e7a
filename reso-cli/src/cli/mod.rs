//! Command-line interface definitions

use clap::{Parser, Subcommand};

pub mod commands;

use commands::replicate::ReplicateCommands;

#[derive(Parser, Debug)]
#[command(name = "reso-cli", author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replicate resources and write a data availability report
    Replicate(ReplicateCommands),
}
