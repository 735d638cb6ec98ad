use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "datastore", version, about = "Write and delete hub datastore values")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Directory holding config/ (and defaults/ for first-run bootstrap)"
    )]
    pub base_dir: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a new value to a datastore.
    Set {
        name: String,
        value: String,
        #[arg(long, default_value = "string", help = "number, number+units, bool or string")]
        format: String,
    },
    /// Delete a datastore.
    Delete {
        name: String,
        #[arg(long, default_value_t = false, help = "Skip the confirmation prompt")]
        yes: bool,
    },
}
