// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use zfs_remote::config::TargetAddress;

#[derive(Parser)]
#[command(name = "zfs-remote")]
#[command(about = "Run storage management commands on a remote host over SSH")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit JSON lines instead of human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to the config file (default: discovered in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Remote target as [user@]host[:port]
    #[arg(short, long, global = true)]
    pub target: Option<TargetAddress>,

    /// Private key file (default: ~/.ssh/id_rsa)
    #[arg(short = 'i', long = "key", global = true)]
    pub key: Option<PathBuf>,

    /// known_hosts file (default: ~/.ssh/known_hosts)
    #[arg(long, global = true)]
    pub known_hosts: Option<PathBuf>,

    /// Reuse one connection for every command
    #[arg(long, global = true)]
    pub keep_alive: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a command on the remote host
    Exec {
        /// Run the command this many times
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        repeat: u32,

        /// Command and arguments, e.g. `zpool list -H`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Connect, open one session, and disconnect
    Check,

    /// Print the target identity without connecting
    Identity,

    /// Write a zfs-remote.yml template in the current directory
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}
