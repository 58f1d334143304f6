//! Tracing setup. `COBRA_LOG` takes an `EnvFilter` directive string
//! (default `warn`); `COBRA_DEBUG=1` raises the default to `debug`.
//! Logs go to stderr so program output on stdout stays clean.
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "COBRA_LOG";
pub const DEBUG_ENV: &str = "COBRA_DEBUG";

static DEBUG: OnceLock<bool> = OnceLock::new();
static INIT: OnceLock<()> = OnceLock::new();

pub fn debug_enabled() -> bool {
    *DEBUG.get_or_init(|| std::env::var(DEBUG_ENV).ok().as_deref() == Some("1"))
}

fn default_level() -> &'static str {
    if debug_enabled() {
        "debug"
    } else {
        "warn"
    }
}

/// Filter from `COBRA_LOG`, or `fallback` when it is unset or invalid.
pub fn filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init() {
    init_with(None);
}

/// Like [`init`], with `level` replacing the default level (the CLI passes
/// `info` for `--profile`).
pub fn init_with(level: Option<&str>) {
    INIT.get_or_init(|| {
        let filter = filter(level.unwrap_or_else(|| default_level()));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init_with(Some("trace"));
        tracing::debug!("still fine");
        assert!(INIT.get().is_some());
    }

    #[test]
    fn init_accepts_a_borrowed_level() {
        let level = String::from("info");
        init_with(Some(level.as_str()));
        drop(level);
        assert!(INIT.get().is_some());
    }
}
