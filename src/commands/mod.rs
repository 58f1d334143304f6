pub mod ast;
pub mod check;
pub mod run;
pub mod tokens;

use std::fs;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;

use crate::core::error::CobraError;
use crate::core::pipeline::Profile;

pub(crate) fn read_source(input: &Path) -> anyhow::Result<String> {
    fs::read_to_string(input).with_context(|| format!("Read source {}", input.display()))
}

/// Directory imports of `input` are resolved against.
pub(crate) fn script_dir(input: &Path) -> &Path {
    match input.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Prints `err` as colored diagnostics against `input` and turns it into the
/// error `main` reports.
pub(crate) fn diagnose(input: &Path, err: CobraError) -> anyhow::Error {
    let label = format!("{}:", err.kind()).red().bold();
    match &err {
        CobraError::Parse(p) => {
            for e in &p.errors {
                eprintln!("{} {}:{}:{}: {}", label, input.display(), e.line, e.column, e.message);
            }
        }
        other => eprintln!("{} {}: {}", label, input.display(), other),
    }
    anyhow::anyhow!("{} failed ({})", input.display(), err.kind())
}

pub(crate) fn print_profile(profile: Option<&Profile>) {
    let Some(profile) = profile else { return };
    for (stage, elapsed) in profile.stages() {
        eprintln!("{} {:<9} {:>10.3} ms", "profile:".cyan().bold(), stage, elapsed.as_secs_f64() * 1e3);
    }
    eprintln!("{} {:<9} {:>10.3} ms", "profile:".cyan().bold(), "total", profile.total().as_secs_f64() * 1e3);
}
