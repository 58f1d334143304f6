use std::path::Path;

use super::{diagnose, print_profile, read_source};
use crate::core::pipeline::Pipeline;

pub fn main(input: &Path, profile: bool) -> anyhow::Result<()> {
    let source = read_source(input)?;
    let mut pipeline = Pipeline::new().profiling(profile);
    let tokens = pipeline.tokenize(&source).map_err(|e| diagnose(input, e))?;
    for tok in &tokens {
        println!("{}", tok);
    }
    print_profile(pipeline.profile());
    Ok(())
}
