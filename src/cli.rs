use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "cobra",
    about = "Cobra language core: tokenize, parse, check and run .co files",
    version,
    propagate_version = true,
    disable_help_subcommand = true
)]
pub struct CobraCli {
    /// Global: path to config (TOML); default: ~/.cobra/cobra.toml
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Global: log and print per-stage timings
    #[arg(long = "profile", action = ArgAction::SetTrue, global = true)]
    pub profile: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Dump the token stream
    Tokens {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Dump the parsed AST
    ///
    /// Examples:
    ///   cobra ast demo.co
    ///   cobra ast demo.co --optimized --json
    Ast {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        /// Print JSON instead of the debug tree
        #[arg(long = "json", action = ArgAction::SetTrue)]
        json: bool,
        /// Run the optimizer first and report what it did
        #[arg(long = "optimized", action = ArgAction::SetTrue)]
        optimized: bool,
    },

    /// Parse and analyze without running
    Check {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Run a .co file with the tree-walking interpreter
    Run {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        /// Force the security validators on, whatever the config says
        #[arg(long = "safe", action = ArgAction::SetTrue)]
        safe: bool,
        /// Override the node limit
        #[arg(long = "node-limit", value_name = "N")]
        node_limit: Option<usize>,
        /// Print the lowered IR after the run
        #[arg(long = "ir", action = ArgAction::SetTrue)]
        ir: bool,
    },
}
