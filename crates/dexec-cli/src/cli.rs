//! CLI argument definitions for dexec.
//!
//! Each command corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "dexec",
    version,
    about = "Resolve .NET references to assemblies",
    long_about = "dexec turns file, folder, nuget, framework and project references into a \
                  deduplicated set of assembly paths for a target framework."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ~/.dexec/config.toml)
    #[arg(long, global = true, env = "DEXEC_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Target framework moniker
    #[arg(short, long, default_value = "net8.0")]
    pub framework: String,

    /// Consider prerelease package versions
    #[arg(long)]
    pub prerelease: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve references to assembly paths
    Resolve {
        /// References (`nuget: Id, 1.2.3`, `folder: ./libs`, ...); prefix with `-` to remove
        #[arg(allow_hyphen_values = true)]
        references: Vec<String>,
        #[command(flatten)]
        target: TargetArgs,
        /// Reference assemblies for compilation instead of run-time assemblies
        #[arg(long)]
        compile: bool,
        /// Add common infrastructure assemblies (DI, logging, configuration, JSON)
        #[arg(long)]
        wide: bool,
        /// Include the web framework
        #[arg(long)]
        web: bool,
        /// Resolve without the session cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Resolve analyzers and source generators
    Analyzers {
        #[arg(allow_hyphen_values = true)]
        references: Vec<String>,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Show the dependency tree of a package
    Tree {
        /// Package id
        package: String,
        /// Package version (defaults to the latest)
        version: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
        /// Maximum depth to display
        #[arg(short, long)]
        depth: Option<usize>,
        /// Explain why a package is in the tree
        #[arg(long)]
        why: Option<String>,
    },

    /// List the versions of a package
    Versions {
        /// Package id
        package: String,
        /// Include prerelease versions
        #[arg(long)]
        prerelease: bool,
    },

    /// Search the configured feeds
    Search {
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 20)]
        take: usize,
        /// Include prerelease versions
        #[arg(long)]
        prerelease: bool,
    },

    /// Show the local .NET installation
    Sdk,
}

pub fn parse() -> Cli {
    Cli::parse()
}
