use std::path::Path;

use colored::Colorize;

use super::{diagnose, print_profile, read_source, script_dir};
use crate::config::CobraConfig;
use crate::core::ast::count_nodes;
use crate::core::pipeline::Pipeline;

pub fn main(input: &Path, cfg: &CobraConfig, profile: bool) -> anyhow::Result<()> {
    let source = read_source(input)?;
    let mut pipeline = Pipeline::new().profiling(profile);
    if let Some(resolver) = cfg.resolver(Some(script_dir(input))) {
        pipeline = pipeline.with_resolver(resolver);
    }
    let out = pipeline.check(&source).map_err(|e| diagnose(input, e))?;
    for a in &out.advisories {
        eprintln!("{} {}:{}:{}: {}", "warn:".yellow().bold(), input.display(), a.line, a.column, a.message);
    }
    println!(
        "{} {} ({} statements, {} nodes)",
        "ok".green().bold(),
        input.display(),
        out.program.len(),
        count_nodes(&out.program)
    );
    print_profile(pipeline.profile());
    Ok(())
}
