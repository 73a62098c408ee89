//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Skiff - content-addressed container image builds
///
/// Builds the images listed in skiff.toml, reusing any image whose inputs
/// have not changed since it was last built.
#[derive(Parser, Debug)]
#[command(name = "skiff")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SKIFF_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build artifacts, reusing cached images where possible
    Build(BuildArgs),

    /// Inspect or reset the build cache
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

#[derive(Parser, Debug, Default)]
pub struct BuildArgs {
    /// Only build these images (repeatable)
    #[arg(short, long = "artifact", value_name = "IMAGE")]
    pub artifacts: Vec<String>,

    /// Ignore the cache and rebuild everything
    #[arg(long)]
    pub no_cache: bool,

    /// Resolve against the local daemon (overrides config)
    #[arg(long, conflicts_with = "remote_cluster")]
    pub local_cluster: bool,

    /// Resolve against the registry (overrides config)
    #[arg(long)]
    pub remote_cluster: bool,

    /// Push built and retagged images
    #[arg(long)]
    pub push: bool,

    /// Abort the run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format for the resolved images
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List index entries
    List {
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show what a build would reuse, retag or rebuild, without changing anything
    Check {
        /// Only check these images (repeatable)
        #[arg(short, long = "artifact", value_name = "IMAGE")]
        artifacts: Vec<String>,
    },

    /// Delete the index
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the index location
    Path,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a default skiff.toml
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Plain,
}
