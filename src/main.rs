//! Cobra CLI: tokens | ast | check | run.
use std::process::ExitCode;

use clap::Parser; // trait import enables CobraCli::parse()
use colored::Colorize;

use cobra_core::cli::{CobraCli, Command};
use cobra_core::commands::{self, run::RunOpts};
use cobra_core::config::CobraConfig;
use cobra_core::core::logging;

fn dispatch(args: CobraCli) -> anyhow::Result<()> {
    match args.cmd {
        Command::Tokens { input } => commands::tokens::main(&input, args.profile),
        Command::Ast { input, json, optimized } => commands::ast::main(&input, json, optimized, args.profile),
        Command::Check { input } => {
            let cfg = CobraConfig::load(args.config.as_deref())?;
            commands::check::main(&input, &cfg, args.profile)
        }
        Command::Run { input, safe, node_limit, ir } => {
            let cfg = CobraConfig::load(args.config.as_deref())?;
            let opts = RunOpts { safe, node_limit, ir, profile: args.profile };
            commands::run::main(&input, &cfg, &opts)
        }
    }
}

fn main() -> ExitCode {
    let args = CobraCli::parse();
    logging::init_with(args.profile.then_some("info"));

    match dispatch(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
