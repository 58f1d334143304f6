//! Validator chain consulted by the interpreter before it runs a node.
//!
//! Each validator inspects one node in isolation (children are checked when
//! the interpreter reaches them). The first rejection aborts the run with a
//! [`DangerousPrimitiveError`]; `try/catch` never intercepts it.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Component, Path};
use std::sync::Arc;

use anyhow::Context as _;
use serde::Deserialize;
use thiserror::Error;

use crate::core::ast::{Node, Target};

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{validator}: {message}")]
pub struct DangerousPrimitiveError {
    pub validator: String,
    pub message: String,
}

impl DangerousPrimitiveError {
    pub fn new(validator: &str, message: impl Into<String>) -> Self {
        DangerousPrimitiveError { validator: validator.to_string(), message: message.into() }
    }
}

pub trait SecurityValidator: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn validate(&self, node: &Node) -> Result<(), DangerousPrimitiveError>;
}

/// Calls that reach outside the interpreter.
pub const DANGEROUS_CALLS: &[&str] = &[
    "eval", "exec", "compile", "__import__", "system", "popen", "spawn", "ejecutar", "sistema",
    "ejecutar_comando", "cargar_biblioteca",
];

/// Calls that touch the filesystem.
pub const FILESYSTEM_CALLS: &[&str] = &[
    "open", "abrir", "leer_archivo", "escribir_archivo", "borrar_archivo", "eliminar_archivo",
    "listar_directorio", "crear_directorio",
];

/// Calls that inspect or rewrite objects by name.
pub const REFLECTION_CALLS: &[&str] = &[
    "getattr", "setattr", "delattr", "hasattr", "globals", "locals", "vars", "dir", "type",
];

/// Modules `usar` may not load.
pub const DENIED_MODULES: &[&str] = &["os", "sys", "subprocess", "socket", "sistema", "red", "ctypes"];

fn callee(node: &Node) -> Option<&str> {
    match node {
        Node::Call { callee, .. } => Some(callee),
        Node::Thread(call) => callee(call),
        _ => None,
    }
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

#[derive(Debug, Default)]
pub struct DangerousCallValidator;

impl SecurityValidator for DangerousCallValidator {
    fn name(&self) -> &str {
        "dangerous-primitive"
    }

    fn validate(&self, node: &Node) -> Result<(), DangerousPrimitiveError> {
        match callee(node) {
            Some(name) if DANGEROUS_CALLS.contains(&name) => {
                Err(DangerousPrimitiveError::new(self.name(), format!("call to '{}' is not allowed", name)))
            }
            _ => Ok(()),
        }
    }
}

/// Rejects absolute or parent-escaping import paths and denied modules.
#[derive(Debug, Default)]
pub struct ImportValidator;

impl ImportValidator {
    fn check_path(&self, path: &str) -> Result<(), DangerousPrimitiveError> {
        let p = Path::new(path);
        if p.is_absolute() || p.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(DangerousPrimitiveError::new(self.name(), format!("import path '{}' escapes the project", path)));
        }
        Ok(())
    }
}

impl SecurityValidator for ImportValidator {
    fn name(&self) -> &str {
        "import-allow-list"
    }

    fn validate(&self, node: &Node) -> Result<(), DangerousPrimitiveError> {
        match node {
            Node::Import { path } => self.check_path(path),
            Node::ImportFrom { module, .. } => self.check_path(module),
            Node::Use { module } if DENIED_MODULES.contains(&module.as_str()) => {
                Err(DangerousPrimitiveError::new(self.name(), format!("module '{}' is not allowed", module)))
            }
            Node::Use { module } => self.check_path(module),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct FilesystemValidator;

impl SecurityValidator for FilesystemValidator {
    fn name(&self) -> &str {
        "filesystem-access"
    }

    fn validate(&self, node: &Node) -> Result<(), DangerousPrimitiveError> {
        match callee(node) {
            Some(name) if FILESYSTEM_CALLS.contains(&name) => {
                Err(DangerousPrimitiveError::new(self.name(), format!("filesystem call '{}' is not allowed", name)))
            }
            _ => Ok(()),
        }
    }
}

/// Dunder attribute access and name-based object inspection.
#[derive(Debug, Default)]
pub struct ReflectionValidator;

impl SecurityValidator for ReflectionValidator {
    fn name(&self) -> &str {
        "reflection"
    }

    fn validate(&self, node: &Node) -> Result<(), DangerousPrimitiveError> {
        let reject = |what: &str| Err(DangerousPrimitiveError::new("reflection", format!("access to '{}' is not allowed", what)));
        match node {
            Node::Attribute { name, .. } if is_dunder(name) => reject(name),
            Node::MethodCall { method, .. } if is_dunder(method) => reject(method),
            Node::Assignment { target: Target::Attribute { name, .. }, .. } if is_dunder(name) => reject(name),
            _ => match callee(node) {
                Some(name) if REFLECTION_CALLS.contains(&name) => reject(name),
                _ => Ok(()),
            },
        }
    }
}

/// Logs every node it sees and accepts it.
#[derive(Debug, Default)]
pub struct AuditValidator;

impl SecurityValidator for AuditValidator {
    fn name(&self) -> &str {
        "audit"
    }

    fn validate(&self, node: &Node) -> Result<(), DangerousPrimitiveError> {
        tracing::info!(target: "cobra::audit", kind = node.kind_name(), "node validated");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Call,
    Import,
    Attribute,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DenyRule {
    pub kind: RuleKind,
    pub name: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default, rename = "rule")]
    rules: Vec<DenyRule>,
}

/// Deny rules read from a TOML file:
///
/// ```toml
/// [[rule]]
/// kind = "call"
/// name = "borrar_todo"
/// message = "prohibido"
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleValidator {
    rules: Vec<DenyRule>,
}

impl RuleValidator {
    pub fn new(rules: Vec<DenyRule>) -> Self {
        RuleValidator { rules }
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let file: RuleFile = toml::from_str(text).context("invalid validator rule file")?;
        Ok(RuleValidator::new(file.rules))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&text)
    }

    pub fn rules(&self) -> &[DenyRule] {
        &self.rules
    }

    fn matching(&self, kind: RuleKind, name: &str) -> Option<&DenyRule> {
        self.rules.iter().find(|r| r.kind == kind && r.name == name)
    }
}

impl SecurityValidator for RuleValidator {
    fn name(&self) -> &str {
        "rules"
    }

    fn validate(&self, node: &Node) -> Result<(), DangerousPrimitiveError> {
        let hit = match node {
            Node::Call { callee, .. } => self.matching(RuleKind::Call, callee),
            Node::Thread(call) => match call.as_ref() {
                Node::Call { callee, .. } => self.matching(RuleKind::Call, callee),
                _ => None,
            },
            Node::Import { path } => self.matching(RuleKind::Import, path),
            Node::Use { module } | Node::ImportFrom { module, .. } => self.matching(RuleKind::Import, module),
            Node::Attribute { name, .. } | Node::MethodCall { method: name, .. } => self.matching(RuleKind::Attribute, name),
            _ => None,
        };
        match hit {
            Some(rule) => Err(DangerousPrimitiveError::new(
                self.name(),
                rule.message.clone().unwrap_or_else(|| format!("'{}' is denied by rule", rule.name)),
            )),
            None => Ok(()),
        }
    }
}

/// Validators run in order; the first error wins.
#[derive(Debug, Clone, Default)]
pub struct ValidatorChain {
    validators: Vec<Arc<dyn SecurityValidator>>,
}

impl ValidatorChain {
    pub fn empty() -> Self {
        ValidatorChain { validators: Vec::new() }
    }

    /// Dangerous calls, imports, filesystem and reflection, preceded by the
    /// audit logger when `audit` is set.
    pub fn default_chain(audit: bool) -> Self {
        let mut chain = ValidatorChain::empty();
        if audit {
            chain.push(Arc::new(AuditValidator));
        }
        chain.push(Arc::new(DangerousCallValidator));
        chain.push(Arc::new(ImportValidator));
        chain.push(Arc::new(FilesystemValidator));
        chain.push(Arc::new(ReflectionValidator));
        chain
    }

    pub fn push(&mut self, v: Arc<dyn SecurityValidator>) {
        self.validators.push(v);
    }

    pub fn extend<I: IntoIterator<Item = Arc<dyn SecurityValidator>>>(&mut self, vs: I) {
        self.validators.extend(vs);
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    pub fn validate(&self, node: &Node) -> Result<(), DangerousPrimitiveError> {
        for v in &self.validators {
            if let Err(e) = v.validate(node) {
                tracing::warn!(validator = v.name(), node = node.kind_name(), "{}", e.message);
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Node identities already accepted by a chain during one run.
#[derive(Debug, Default)]
pub struct ValidatedSet {
    seen: HashSet<usize>,
}

impl ValidatedSet {
    /// Runs `chain` on `node` unless this exact node passed before.
    pub fn check(&mut self, chain: &ValidatorChain, node: &Node) -> Result<(), DangerousPrimitiveError> {
        let id = node as *const Node as usize;
        if self.seen.contains(&id) {
            return Ok(());
        }
        chain.validate(node)?;
        self.seen.insert(id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chain_rejects_dangerous_calls() {
        let chain = ValidatorChain::default_chain(false);
        let err = chain.validate(&Node::call("eval", vec![Node::string("1")])).unwrap_err();
        assert_eq!(err.validator, "dangerous-primitive");
        assert!(chain.validate(&Node::call("imprimir", vec![])).is_ok());
    }

    #[test]
    fn imports_must_stay_relative() {
        let chain = ValidatorChain::default_chain(false);
        assert!(chain.validate(&Node::Import { path: "/etc/passwd".into() }).is_err());
        assert!(chain.validate(&Node::Import { path: "../fuera".into() }).is_err());
        assert!(chain.validate(&Node::Use { module: "os".into() }).is_err());
        assert!(chain.validate(&Node::Import { path: "util".into() }).is_ok());
    }

    #[test]
    fn reflection_and_filesystem() {
        let chain = ValidatorChain::default_chain(false);
        let dunder = Node::Attribute { object: Box::new(Node::ident("p")), name: "__class__".into() };
        assert_eq!(chain.validate(&dunder).unwrap_err().validator, "reflection");
        assert_eq!(chain.validate(&Node::call("abrir", vec![])).unwrap_err().validator, "filesystem-access");
    }

    #[test]
    fn rule_file_adds_denials() {
        let rules = RuleValidator::from_toml(
            "[[rule]]\nkind = \"call\"\nname = \"borrar_todo\"\nmessage = \"prohibido\"\n",
        )
        .unwrap();
        assert_eq!(rules.rules().len(), 1);
        let mut chain = ValidatorChain::empty();
        chain.push(Arc::new(rules));
        let err = chain.validate(&Node::call("borrar_todo", vec![])).unwrap_err();
        assert_eq!(err.to_string(), "rules: prohibido");
    }

    #[test]
    fn validated_set_checks_each_node_once() {
        let chain = ValidatorChain::default_chain(true);
        let node = Node::call("imprimir", vec![]);
        let mut set = ValidatedSet::default();
        set.check(&chain, &node).unwrap();
        set.check(&chain, &node).unwrap();
        assert_eq!(set.len(), 1);
    }
}
