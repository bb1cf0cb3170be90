use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dotdeploy")]
#[command(version)]
#[command(about = "Run declarative copy, move and execute actions across hosts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Connect to every host and run the actions in a descriptor
    Run(RunArgs),

    /// Validate a descriptor and print its action tree without connecting
    Check(CheckArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Run descriptor (YAML, or JSON/TOML by extension)
    #[arg(short, long, default_value = ".deploy", env = "DOTDEPLOY_FILE")]
    pub file: PathBuf,

    /// Keep the work folder after the run
    #[arg(long)]
    pub keep: bool,

    /// Seconds to wait for each TCP connection
    #[arg(long, default_value_t = 30)]
    pub connect_timeout: u64,

    /// Skip verifying host keys against ~/.ssh/known_hosts
    #[arg(long)]
    pub no_host_key_check: bool,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Run descriptor (YAML, or JSON/TOML by extension)
    #[arg(short, long, default_value = ".deploy", env = "DOTDEPLOY_FILE")]
    pub file: PathBuf,
}
