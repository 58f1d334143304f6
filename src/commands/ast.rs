use std::path::Path;

use anyhow::Context;
use colored::Colorize;

use super::{diagnose, print_profile, read_source};
use crate::core::pipeline::Pipeline;

pub fn main(input: &Path, json: bool, optimized: bool, profile: bool) -> anyhow::Result<()> {
    let source = read_source(input)?;
    let mut pipeline = Pipeline::new().profiling(profile);
    let mut program = pipeline.parse(&source).map_err(|e| diagnose(input, e))?.program;
    if optimized {
        let (out, stats) = pipeline.optimize(program);
        program = out;
        eprintln!("{} {}", "optimizer:".green().bold(), serde_json::to_string(&stats)?);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&program).context("Serialize AST")?);
    } else {
        for node in &program {
            println!("{:#?}", node);
        }
    }
    print_profile(pipeline.profile());
    Ok(())
}
