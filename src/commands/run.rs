use std::path::Path;

use colored::Colorize;

use super::{diagnose, print_profile, read_source, script_dir};
use crate::config::CobraConfig;
use crate::core::interpreter::{value::Value, Interpreter};
use crate::core::pipeline::Pipeline;

pub struct RunOpts {
    pub safe: bool,
    pub node_limit: Option<usize>,
    pub ir: bool,
    pub profile: bool,
}

pub fn main(input: &Path, cfg: &CobraConfig, opts: &RunOpts) -> anyhow::Result<()> {
    let source = read_source(input)?;
    let mut options = cfg.execute.clone();
    if opts.safe {
        options.safe_mode = true;
    }
    if let Some(limit) = opts.node_limit {
        options.node_limit = limit;
    }

    let mut builder = Interpreter::builder().memory_manager(cfg.memory_manager());
    if let Some(resolver) = cfg.resolver(Some(script_dir(input))) {
        builder = builder.resolver(resolver);
    }
    let mut interp = builder.build();
    let mut pipeline = Pipeline::new().profiling(opts.profile);

    let result = pipeline.run(&mut interp, &source, &options);
    if opts.ir {
        if let Some(ir) = interp.last_ir() {
            eprint!("{}", ir);
        }
    }
    print_profile(pipeline.profile());
    match result.map_err(|e| diagnose(input, e))? {
        Some(Value::Null) | None => {}
        Some(value) => println!("{} {}", "=>".dimmed(), value),
    }
    Ok(())
}
