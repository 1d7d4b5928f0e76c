//! gatewarden - permission resolution and tree-cache server

use clap::Parser;
use color_eyre::eyre::Result;
use gatewarden::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(cmd) => cmd.run().await,
    }
}
