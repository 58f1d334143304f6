//! Scope tree used by the semantic analyzer.
//!
//! Scopes live in an arena and point at their parent by index, so closing a
//! scope only moves the cursor; the tree itself stays available for
//! inspection after analysis.

use std::collections::HashMap;

use serde::Serialize;

pub const MAX_RESOLVE_DEPTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Variable,
    Function,
    Class,
    Builtin,
}

#[derive(Debug, Default)]
pub struct Scope {
    pub parent: Option<usize>,
    pub symbols: HashMap<String, SymbolKind>,
}

#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    current: usize,
}

/// Returned by [`ScopeTree::declare`] when the name already exists in the
/// current scope.
#[derive(Debug, Clone, PartialEq)]
pub struct AlreadyDeclared(pub SymbolKind);

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        ScopeTree { scopes: vec![Scope::default()], current: 0 }
    }

    /// Opens a child of the current scope and makes it current.
    pub fn push(&mut self) {
        self.scopes.push(Scope { parent: Some(self.current), symbols: HashMap::new() });
        self.current = self.scopes.len() - 1;
    }

    /// Returns to the parent scope. The global scope is never closed.
    pub fn pop(&mut self) {
        if let Some(parent) = self.scopes[self.current].parent {
            self.current = parent;
        }
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut at = self.scopes[self.current].parent;
        while let Some(i) = at {
            depth += 1;
            at = self.scopes[i].parent;
        }
        depth
    }

    pub fn declare(&mut self, name: &str, kind: SymbolKind) -> Result<(), AlreadyDeclared> {
        let scope = &mut self.scopes[self.current];
        if let Some(existing) = scope.symbols.get(name) {
            return Err(AlreadyDeclared(*existing));
        }
        scope.symbols.insert(name.to_string(), kind);
        Ok(())
    }

    /// Declares `name` unless the current scope already has it.
    pub fn declare_if_absent(&mut self, name: &str, kind: SymbolKind) {
        self.scopes[self.current].symbols.entry(name.to_string()).or_insert(kind);
    }

    pub fn declared_here(&self, name: &str) -> bool {
        self.scopes[self.current].symbols.contains_key(name)
    }

    /// Searches the current scope, then each ancestor.
    /// Looks `name` up from the current scope outward. At most
    /// [`MAX_RESOLVE_DEPTH`] scopes are searched.
    pub fn resolve(&self, name: &str) -> Option<SymbolKind> {
        let mut at = Some(self.current);
        let mut hops = 0;
        while let Some(i) = at {
            if hops > MAX_RESOLVE_DEPTH {
                tracing::warn!(name, "scope chain too deep; giving up");
                return None;
            }
            hops += 1;
            if let Some(kind) = self.scopes[i].symbols.get(name) {
                return Some(*kind);
            }
            at = self.scopes[i].parent;
        }
        None
    }

    /// Names declared in the global scope, builtins excluded, sorted.
    pub fn global_names(&self) -> Vec<(String, SymbolKind)> {
        let mut names: Vec<(String, SymbolKind)> = self.scopes[0]
            .symbols
            .iter()
            .filter(|(_, kind)| **kind != SymbolKind::Builtin)
            .map(|(n, k)| (n.clone(), *k))
            .collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        names
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
