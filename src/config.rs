use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::interpreter::ExecuteOptions;
use crate::core::memory::{MemoryManager, MemoryStrategy, DEFAULT_EVOLVE_EVERY};
use crate::core::resolver::{FsModuleResolver, ModuleResolver};

pub const CONFIG_DIR: &str = ".cobra";
pub const CONFIG_FILE: &str = "cobra.toml";

/// Contents of `cobra.toml`. Every table and key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CobraConfig {
    pub execute: ExecuteOptions,
    pub imports: ImportsConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportsConfig {
    /// Directories modules may be loaded from. Relative entries are taken
    /// relative to the config file.
    pub allowed_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    pub strategy: MemoryStrategy,
    pub evolve_every: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig { strategy: MemoryStrategy::default(), evolve_every: DEFAULT_EVOLVE_EVERY }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    // ~\Users\you\.cobra\cobra.toml on Windows; ~/.cobra/cobra.toml elsewhere
    dirs_next::home_dir().map(|h| h.join(CONFIG_DIR).join(CONFIG_FILE))
}

impl CobraConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Parse cobra config")
    }

    /// Loads `explicit` (which must exist) or the default location (which
    /// may not).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => match default_config_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };
        if !required && !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Read config {}", path.display()))?;
        let mut cfg = Self::from_toml(&text).with_context(|| format!("Load config {}", path.display()))?;
        if let Some(base) = path.parent() {
            cfg.anchor(base);
        }
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(cfg)
    }

    fn anchor(&mut self, base: &Path) {
        for dir in &mut self.imports.allowed_dirs {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        if let Some(file) = self.execute.validators_file.as_mut() {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
    }

    pub fn memory_manager(&self) -> MemoryManager {
        MemoryManager::new(self.memory.strategy.build()).with_evolve_every(self.memory.evolve_every)
    }

    /// Resolver over the configured directories plus `extra` (the CLI passes
    /// the script's own directory). `None` when no directory is usable.
    pub fn resolver(&self, extra: Option<&Path>) -> Option<Arc<dyn ModuleResolver>> {
        let dirs: Vec<&Path> = self.imports.allowed_dirs.iter().map(PathBuf::as_path).chain(extra).collect();
        let resolver = FsModuleResolver::new(dirs);
        if resolver.allowed_dirs().is_empty() {
            return None;
        }
        Some(Arc::new(resolver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = CobraConfig::from_toml("").unwrap();
        assert!(cfg.execute.safe_mode);
        assert_eq!(cfg.execute.node_limit, 10_000);
        assert_eq!(cfg.memory.strategy, MemoryStrategy::FreeList);
        assert!(cfg.imports.allowed_dirs.is_empty());
    }

    #[test]
    fn tables_are_read() {
        let cfg = CobraConfig::from_toml(
            "[execute]\nsafe_mode = false\nnode_limit = 50\nmemory_limit_mb = 256\n\n[memory]\nstrategy = \"genetic\"\nevolve_every = 10\n",
        )
        .unwrap();
        assert!(!cfg.execute.safe_mode);
        assert_eq!(cfg.execute.node_limit, 50);
        assert_eq!(cfg.execute.memory_limit_mb, Some(256));
        assert_eq!(cfg.memory.strategy, MemoryStrategy::Genetic);
        assert_eq!(cfg.memory.evolve_every, 10);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(CobraConfig::from_toml("[memory]\nestrategia = \"x\"\n").is_err());
    }

    #[test]
    fn relative_dirs_follow_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("mods")).unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[imports]\nallowed_dirs = [\"mods\"]\n").unwrap();
        let cfg = CobraConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.imports.allowed_dirs, vec![dir.path().join("mods")]);
        assert!(cfg.resolver(None).is_some());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CobraConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(format!("{:#}", err).contains("Read config"));
    }
}
