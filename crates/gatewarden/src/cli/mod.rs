//! cli subcommands for gatewarden.

mod serve;

pub use serve::ServeCommand;

use clap::{Parser, Subcommand};

/// gatewarden - permission resolution and tree-cache server
#[derive(Parser, Debug)]
#[command(name = "gatewarden")]
#[command(about = "Permission resolution and tree-cache server", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// top-level commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// run the query server
    Serve(ServeCommand),
}
