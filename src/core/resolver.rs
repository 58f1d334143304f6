//! Module loading for `import`, `usar` and `desde ... import`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::ast::Node;
use crate::core::parser;

/// File extension tried when an import path has none.
pub const SOURCE_EXTENSION: &str = "co";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("module '{path}' not found")]
    NotFound { path: String },
    #[error("module '{path}' is outside the allowed import directories")]
    NotAllowed { path: String },
    #[error("cannot read module '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("module '{path}' failed to parse: {message}")]
    Syntax { path: String, message: String },
}

pub trait ModuleResolver: Send + Sync {
    /// Canonical location of `path`. Used as the memoization key.
    fn resolve(&self, path: &str) -> Result<PathBuf, ResolveError>;

    /// Loads and parses the module at `path`.
    fn load(&self, path: &str) -> Result<Vec<Node>, ResolveError>;
}

/// Resolves modules on disk, restricted to a set of allowed directories.
/// Relative paths are looked up in each directory in order; absolute paths
/// and symlinks must still land inside one of them.
#[derive(Debug, Clone)]
pub struct FsModuleResolver {
    allowed_dirs: Vec<PathBuf>,
}

impl FsModuleResolver {
    /// Directories that do not exist are dropped with a warning.
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let allowed_dirs = dirs
            .into_iter()
            .filter_map(|d| match d.as_ref().canonicalize() {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(dir = %d.as_ref().display(), error = %e, "ignoring import directory");
                    None
                }
            })
            .collect();
        FsModuleResolver { allowed_dirs }
    }

    pub fn allowed_dirs(&self) -> &[PathBuf] {
        &self.allowed_dirs
    }

    fn is_allowed(&self, canonical: &Path) -> bool {
        self.allowed_dirs.iter().any(|dir| canonical.starts_with(dir))
    }

    fn candidates(&self, path: &str) -> Vec<PathBuf> {
        let raw = Path::new(path);
        let mut names = vec![raw.to_path_buf()];
        if raw.extension().is_none() {
            names.push(raw.with_extension(SOURCE_EXTENSION));
        }
        if raw.is_absolute() {
            return names;
        }
        self.allowed_dirs
            .iter()
            .flat_map(|dir| names.iter().map(move |n| dir.join(n)))
            .collect()
    }
}

impl ModuleResolver for FsModuleResolver {
    fn resolve(&self, path: &str) -> Result<PathBuf, ResolveError> {
        for candidate in self.candidates(path) {
            if !candidate.is_file() {
                continue;
            }
            let canonical = candidate.canonicalize().map_err(|source| ResolveError::Io {
                path: path.to_string(),
                source,
            })?;
            if !self.is_allowed(&canonical) {
                tracing::warn!(module = path, resolved = %canonical.display(), "import escapes allowed directories");
                return Err(ResolveError::NotAllowed { path: path.to_string() });
            }
            return Ok(canonical);
        }
        Err(ResolveError::NotFound { path: path.to_string() })
    }

    fn load(&self, path: &str) -> Result<Vec<Node>, ResolveError> {
        let resolved = self.resolve(path)?;
        tracing::debug!(module = path, file = %resolved.display(), "loading module");
        let source = fs::read_to_string(&resolved).map_err(|source| ResolveError::Io {
            path: path.to_string(),
            source,
        })?;
        parser::parse_source(&source)
            .map(|out| out.program)
            .map_err(|e| ResolveError::Syntax { path: path.to_string(), message: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_module_with_implicit_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("util.co"), "func doble(x):\n  retorno x * 2\nfin\n").unwrap();
        let resolver = FsModuleResolver::new([dir.path()]);
        let program = resolver.load("util").unwrap();
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn rejects_absolute_path_outside_allow_list() {
        let allowed = tempdir().unwrap();
        let other = tempdir().unwrap();
        let outside = other.path().join("secreto.co");
        fs::write(&outside, "var x = 1").unwrap();
        let resolver = FsModuleResolver::new([allowed.path()]);
        let err = resolver.resolve(outside.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ResolveError::NotAllowed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escaping_allow_list() {
        let allowed = tempdir().unwrap();
        let other = tempdir().unwrap();
        let target = other.path().join("fuera.co");
        fs::write(&target, "var x = 1").unwrap();
        std::os::unix::fs::symlink(&target, allowed.path().join("enlace.co")).unwrap();
        let resolver = FsModuleResolver::new([allowed.path()]);
        assert!(matches!(resolver.resolve("enlace"), Err(ResolveError::NotAllowed { .. })));
    }

    #[test]
    fn missing_module() {
        let dir = tempdir().unwrap();
        let resolver = FsModuleResolver::new([dir.path()]);
        assert!(matches!(resolver.load("nada"), Err(ResolveError::NotFound { .. })));
    }
}
