use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::vision::{self, ServeArgs};

#[derive(Debug, Parser)]
#[command(name = "wildcam", version, about = "Live wildlife classification over HTTP")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the stream, prediction, snapshot, and release endpoints.
    Serve(ServeArgs),
    /// Load the model and validate labels, then exit.
    Check(ServeArgs),
}

pub fn handle_commands(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve(args) => vision::serve(args),
        Command::Check(args) => vision::check(args),
    }
}
