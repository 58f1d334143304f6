//! Resource ceilings applied around an `execute` call.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Address-space ceiling in megabytes.
    MemoryMb,
    /// CPU time ceiling in seconds.
    CpuSeconds,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::MemoryMb => write!(f, "memory"),
            Resource::CpuSeconds => write!(f, "cpu"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    #[error("program has {count} nodes, above the limit of {limit}")]
    NodeLimit { count: usize, limit: usize },
    #[error("circular reference while resolving '{name}'")]
    CircularReference { name: String },
    #[error("memory arena exhausted while requesting {requested} block(s)")]
    MemoryExhausted { requested: usize },
    #[error("cannot set {resource} limit: {message}")]
    Limit { resource: Resource, message: String },
}

pub trait ResourceLimiter: Send + Sync {
    fn set_limit(&self, resource: Resource, value: u64) -> Result<(), ResourceError>;
}

/// Accepts every request and does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLimiter;

impl ResourceLimiter for NoopLimiter {
    fn set_limit(&self, resource: Resource, value: u64) -> Result<(), ResourceError> {
        tracing::debug!(%resource, value, "resource limit ignored");
        Ok(())
    }
}

/// Lowers the soft `setrlimit` ceiling of the current process. On platforms
/// without `setrlimit` the request is logged and skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLimiter;

#[cfg(unix)]
impl ResourceLimiter for ProcessLimiter {
    fn set_limit(&self, resource: Resource, value: u64) -> Result<(), ResourceError> {
        let (which, amount) = match resource {
            Resource::MemoryMb => (libc::RLIMIT_AS, value.saturating_mul(1024 * 1024)),
            Resource::CpuSeconds => (libc::RLIMIT_CPU, value),
        };
        let mut current = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
        // SAFETY: `current` is a valid, writable rlimit struct.
        if unsafe { libc::getrlimit(which, &mut current) } != 0 {
            return Err(ResourceError::Limit { resource, message: std::io::Error::last_os_error().to_string() });
        }
        let wanted = amount as libc::rlim_t;
        let next = libc::rlimit {
            rlim_cur: if current.rlim_max == libc::RLIM_INFINITY { wanted } else { wanted.min(current.rlim_max) },
            rlim_max: current.rlim_max,
        };
        // SAFETY: `next` is a fully initialized rlimit struct.
        if unsafe { libc::setrlimit(which, &next) } != 0 {
            let err = std::io::Error::last_os_error();
            tracing::warn!(%resource, value, error = %err, "setrlimit failed");
            return Err(ResourceError::Limit { resource, message: err.to_string() });
        }
        tracing::debug!(%resource, value, "resource limit applied");
        Ok(())
    }
}

#[cfg(not(unix))]
impl ResourceLimiter for ProcessLimiter {
    fn set_limit(&self, resource: Resource, value: u64) -> Result<(), ResourceError> {
        tracing::warn!(%resource, value, "resource limits are not supported on this platform; skipping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_accepts_everything() {
        assert!(NoopLimiter.set_limit(Resource::MemoryMb, 1).is_ok());
        assert!(NoopLimiter.set_limit(Resource::CpuSeconds, 0).is_ok());
    }

    #[test]
    fn error_messages_name_the_resource() {
        let e = ResourceError::Limit { resource: Resource::CpuSeconds, message: "denied".into() };
        assert_eq!(e.to_string(), "cannot set cpu limit: denied");
    }
}
