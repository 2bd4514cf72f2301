//! Rewind CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// Rewind - point-in-time restores of PXC clusters
#[derive(Parser, Debug)]
#[command(name = "rewind")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub kube: commands::KubeArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore an environment's database to a point in time in a new cluster
    Restore(commands::restore::RestoreArgs),
    /// List backups of an environment with their recovery windows
    Backups(commands::backups::BackupsArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Restore(args) => commands::restore::run(&self.kube, args).await,
            Commands::Backups(args) => commands::backups::run(&self.kube, args).await,
        }
    }
}
