//! CLI for the tumblr-backup engine.

mod args;
mod commands;

pub use args::BackupArgs;
pub use commands::{run_backup, run_set_consumer_key};

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tumblr-backup")]
#[command(about = "Incremental, resumable backups of Tumblr blogs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Back up one or more Tumblr blogs.
    Backup(BackupArgs),

    /// Store the OAuth consumer key used to authenticate API requests.
    SetConsumerKey {
        /// The v2 API consumer key from a registered Tumblr application.
        key: String,
    },
}
