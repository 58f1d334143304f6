// src/core/semantic_analyzer.rs
//! Scope-resolving semantic analyzer:
//! - Builds the scope tree while walking the AST
//! - Rejects duplicate declarations in one scope (shadowing in a child is fine)
//! - Resolves every identifier use and call target
//! - Validates class bases and inheritance cycles
//! - Re-checks guard termination as a hard error
//! - Pulls imported module names into scope through an optional resolver

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::core::ast::{self, Case, ClassDef, FunctionDef, MethodDef, Node, Target};
use crate::core::resolver::ModuleResolver;
use crate::core::scope::{AlreadyDeclared, ScopeTree, SymbolKind};
use crate::core::visitor::Visitor;

/// Names available before any user declaration.
pub const BUILTINS: &[&str] = &[
    "imprimir", "longitud", "rango", "texto", "entero", "flotante", "tipo", "siguiente", "lista", "contiene",
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SemanticError {
    #[error("Name '{name}' is not defined")]
    NameError { name: String },
    #[error("'{name}' is already declared in this scope")]
    DuplicateDeclaration { name: String },
    #[error("Class '{class}' extends unknown class '{base}'")]
    UnknownBase { class: String, base: String },
    #[error("Inheritance cycle: '{class}' is reachable from its base '{base}'")]
    InheritanceCycle { class: String, base: String },
    #[error("Guard escape branch must leave the enclosing block")]
    UnprovenGuard,
    #[error("Duplicate parameter '{name}'")]
    DuplicateParameter { name: String },
    #[error("Cannot import '{path}': {message}")]
    Import { path: String, message: String },
}

/// Walks the program once, in order. A function body is checked where the
/// function is declared, so it may call itself and anything declared above
/// it but not a function declared further down; mutual recursion between
/// top-level functions is rejected with [`SemanticError::NameError`]. This
/// matches the interpreter, where a `func` binds its name only when the
/// statement runs.
pub struct SemanticAnalyzer {
    scopes: ScopeTree,
    /// class name → declared base names
    hierarchy: HashMap<String, Vec<String>>,
    resolver: Option<Arc<dyn ModuleResolver>>,
    /// resolved module path → top-level names it declares
    module_names: HashMap<PathBuf, Vec<(String, SymbolKind)>>,
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        let mut scopes = ScopeTree::new();
        for name in BUILTINS {
            scopes.declare_if_absent(name, SymbolKind::Builtin);
        }
        SemanticAnalyzer { scopes, hierarchy: HashMap::new(), resolver: None, module_names: HashMap::new() }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Walks `program` and stops at the first error.
    pub fn analyze(&mut self, program: &[Node]) -> Result<(), SemanticError> {
        self.visit_block(program)?;
        tracing::debug!(scopes = self.scopes.len(), classes = self.hierarchy.len(), "semantic analysis finished");
        Ok(())
    }

    pub fn scopes(&self) -> &ScopeTree {
        &self.scopes
    }

    fn declare(&mut self, name: &str, kind: SymbolKind) -> Result<(), SemanticError> {
        self.scopes
            .declare(name, kind)
            .map_err(|AlreadyDeclared(_)| SemanticError::DuplicateDeclaration { name: name.to_string() })
    }

    fn resolve(&self, name: &str) -> Result<SymbolKind, SemanticError> {
        self.scopes.resolve(name).ok_or_else(|| SemanticError::NameError { name: name.to_string() })
    }

    fn in_child_scope<F>(&mut self, f: F) -> Result<(), SemanticError>
    where
        F: FnOnce(&mut Self) -> Result<(), SemanticError>,
    {
        self.scopes.push();
        let out = f(self);
        self.scopes.pop();
        out
    }

    fn declare_params(&mut self, params: &[String]) -> Result<(), SemanticError> {
        for p in params {
            if self.scopes.declared_here(p) {
                return Err(SemanticError::DuplicateParameter { name: p.clone() });
            }
            self.scopes.declare_if_absent(p, SymbolKind::Variable);
        }
        Ok(())
    }

    fn analyze_callable(&mut self, params: &[String], body: &[Node]) -> Result<(), SemanticError> {
        self.in_child_scope(|a| {
            a.declare_params(params)?;
            a.visit_block(body)
        })
    }

    /// True when `target` is `start` or one of its ancestors.
    fn reachable(&self, start: &str, target: &str) -> bool {
        let mut stack = vec![start.to_string()];
        let mut seen = std::collections::HashSet::new();
        while let Some(name) = stack.pop() {
            if name == target {
                return true;
            }
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(bases) = self.hierarchy.get(&name) {
                stack.extend(bases.iter().cloned());
            }
        }
        false
    }

    /// Top-level names of the module at `path`, memoized per resolved file.
    fn module_exports(&mut self, path: &str) -> Result<Option<Vec<(String, SymbolKind)>>, SemanticError> {
        let resolver = match &self.resolver {
            Some(r) => Arc::clone(r),
            None => return Ok(None),
        };
        let import_err = |e: &dyn std::fmt::Display| SemanticError::Import { path: path.to_string(), message: e.to_string() };
        let key = resolver.resolve(path).map_err(|e| import_err(&e))?;
        if let Some(names) = self.module_names.get(&key) {
            return Ok(Some(names.clone()));
        }
        let program = resolver.load(path).map_err(|e| import_err(&e))?;
        let mut sub = SemanticAnalyzer::new().with_resolver(Arc::clone(&resolver));
        sub.module_names = std::mem::take(&mut self.module_names);
        // placeholder entry stops import cycles from recursing forever
        sub.module_names.insert(key.clone(), Vec::new());
        let result = sub.analyze(&program);
        self.module_names = std::mem::take(&mut sub.module_names);
        result.map_err(|e| import_err(&e))?;
        let names = sub.scopes.global_names();
        tracing::debug!(module = path, names = names.len(), "module names imported");
        self.module_names.insert(key, names.clone());
        Ok(Some(names))
    }

    fn analyze_class(&mut self, class: &ClassDef) -> Result<(), SemanticError> {
        for base in &class.bases {
            if *base == class.name {
                return Err(SemanticError::InheritanceCycle { class: class.name.clone(), base: base.clone() });
            }
            if self.resolve(base)? != SymbolKind::Class {
                return Err(SemanticError::UnknownBase { class: class.name.clone(), base: base.clone() });
            }
            if self.reachable(base, &class.name) {
                return Err(SemanticError::InheritanceCycle { class: class.name.clone(), base: base.clone() });
            }
        }
        self.declare(&class.name, SymbolKind::Class)?;
        self.hierarchy.insert(class.name.clone(), class.bases.clone());
        self.in_child_scope(|a| {
            for method in &class.methods {
                a.analyze_method(method)?;
            }
            Ok(())
        })
    }

    fn analyze_method(&mut self, method: &MethodDef) -> Result<(), SemanticError> {
        self.declare(&method.name, SymbolKind::Function)?;
        self.analyze_callable(&method.params, &method.body)
    }
}

impl Visitor for SemanticAnalyzer {
    type Error = SemanticError;

    fn visit_assignment(&mut self, _node: &Node, target: &Target, value: &Node) -> Result<(), SemanticError> {
        value.accept(self)?;
        match target {
            Target::Name(name) => {
                self.scopes.declare_if_absent(name, SymbolKind::Variable);
                Ok(())
            }
            Target::Attribute { object, .. } => object.accept(self),
        }
    }

    fn visit_identifier(&mut self, name: &str) -> Result<(), SemanticError> {
        self.resolve(name).map(|_| ())
    }

    fn visit_function(&mut self, _node: &Node, func: &FunctionDef) -> Result<(), SemanticError> {
        for d in &func.decorators {
            d.accept(self)?;
        }
        self.declare(&func.name, SymbolKind::Function)?;
        self.analyze_callable(&func.params, &func.body)
    }

    fn visit_method(&mut self, _node: &Node, method: &MethodDef) -> Result<(), SemanticError> {
        self.analyze_method(method)
    }

    fn visit_class(&mut self, _node: &Node, class: &ClassDef) -> Result<(), SemanticError> {
        self.analyze_class(class)
    }

    fn visit_guard(&mut self, node: &Node, _cond: &Node, _body: &[Node], escape: &[Node]) -> Result<(), SemanticError> {
        if !ast::block_terminates(escape) {
            return Err(SemanticError::UnprovenGuard);
        }
        self.generic_visit(node)
    }

    fn visit_for(&mut self, _node: &Node, var: &str, iterable: &Node, body: &[Node]) -> Result<(), SemanticError> {
        iterable.accept(self)?;
        self.scopes.declare_if_absent(var, SymbolKind::Variable);
        self.visit_block(body)
    }

    fn visit_lambda(&mut self, _node: &Node, params: &[String], body: &Node) -> Result<(), SemanticError> {
        self.in_child_scope(|a| {
            a.declare_params(params)?;
            body.accept(a)
        })
    }

    fn visit_comprehension(
        &mut self,
        _node: &Node,
        parts: &[&Node],
        var: &str,
        iterable: &Node,
        cond: Option<&Node>,
    ) -> Result<(), SemanticError> {
        iterable.accept(self)?;
        self.in_child_scope(|a| {
            a.scopes.declare_if_absent(var, SymbolKind::Variable);
            if let Some(c) = cond {
                c.accept(a)?;
            }
            for p in parts {
                p.accept(a)?;
            }
            Ok(())
        })
    }

    fn visit_try(
        &mut self,
        _node: &Node,
        body: &[Node],
        catch_name: Option<&str>,
        catch_block: &[Node],
        finally_block: &[Node],
    ) -> Result<(), SemanticError> {
        self.visit_block(body)?;
        self.in_child_scope(|a| {
            if let Some(name) = catch_name {
                a.scopes.declare_if_absent(name, SymbolKind::Variable);
            }
            a.visit_block(catch_block)
        })?;
        self.visit_block(finally_block)
    }

    fn visit_with(&mut self, _node: &Node, context: &Node, alias: Option<&str>, body: &[Node]) -> Result<(), SemanticError> {
        context.accept(self)?;
        self.in_child_scope(|a| {
            if let Some(name) = alias {
                a.scopes.declare_if_absent(name, SymbolKind::Variable);
            }
            a.visit_block(body)
        })
    }

    fn visit_switch(&mut self, _node: &Node, subject: &Node, cases: &[Case], default: &[Node]) -> Result<(), SemanticError> {
        subject.accept(self)?;
        for case in cases {
            self.in_child_scope(|a| {
                for name in case.pattern.bindings() {
                    a.scopes.declare_if_absent(name, SymbolKind::Variable);
                }
                if let Some(g) = &case.guard {
                    g.accept(a)?;
                }
                a.visit_block(&case.body)
            })?;
        }
        self.visit_block(default)
    }

    fn visit_import(&mut self, _node: &Node, path: &str) -> Result<(), SemanticError> {
        if let Some(names) = self.module_exports(path)? {
            for (name, kind) in names {
                self.scopes.declare_if_absent(&name, kind);
            }
        }
        Ok(())
    }

    fn visit_import_from(&mut self, _node: &Node, module: &str, name: &str, alias: Option<&str>) -> Result<(), SemanticError> {
        let bound = alias.unwrap_or(name);
        match self.module_exports(module)? {
            Some(names) => {
                let kind = names
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, k)| *k)
                    .ok_or_else(|| SemanticError::Import {
                        path: module.to_string(),
                        message: format!("module has no name '{}'", name),
                    })?;
                self.scopes.declare_if_absent(bound, kind);
            }
            None => self.scopes.declare_if_absent(bound, SymbolKind::Variable),
        }
        Ok(())
    }

    fn visit_scope_names(&mut self, _node: &Node, names: &[String]) -> Result<(), SemanticError> {
        for n in names {
            self.scopes.declare_if_absent(n, SymbolKind::Variable);
        }
        Ok(())
    }

    fn visit_type_decl(&mut self, _node: &Node, name: &str) -> Result<(), SemanticError> {
        self.declare(name, SymbolKind::Class)
    }

    fn visit_call(&mut self, node: &Node, callee: &str, _args: &[Node]) -> Result<(), SemanticError> {
        self.resolve(callee)?;
        self.generic_visit(node)
    }

    fn visit_macro(&mut self, _node: &Node, name: &str, body: &[Node]) -> Result<(), SemanticError> {
        self.declare(name, SymbolKind::Function)?;
        self.in_child_scope(|a| a.visit_block(body))
    }

    fn visit_typed_collection(&mut self, node: &Node, name: &str) -> Result<(), SemanticError> {
        self.generic_visit(node)?;
        self.scopes.declare_if_absent(name, SymbolKind::Variable);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_source;

    fn analyze(src: &str) -> Result<(), SemanticError> {
        let program = parse_source(src).unwrap().program;
        SemanticAnalyzer::new().analyze(&program)
    }

    #[test]
    fn redeclare_function_fails() {
        let err = analyze("func f():\n  pasar\nfin\nfunc f():\n  pasar\nfin").unwrap_err();
        assert_eq!(err, SemanticError::DuplicateDeclaration { name: "f".into() });
    }

    #[test]
    fn later_functions_are_not_visible_to_earlier_ones() {
        let src = "func par(n):\n  retorno impar(n - 1)\nfin\nfunc impar(n):\n  retorno par(n - 1)\nfin";
        assert_eq!(analyze(src).unwrap_err(), SemanticError::NameError { name: "impar".into() });
        let ordered = "func impar(n):\n  retorno n\nfin\nfunc par(n):\n  retorno impar(n - 1)\nfin";
        assert!(analyze(ordered).is_ok());
        assert!(analyze("func f(n):\n  retorno f(n - 1)\nfin").is_ok());
    }

    #[test]
    fn shadowing_in_function_ok() {
        assert!(analyze("var x = 1\nfunc g():\n  var x = 2\n  retorno x\nfin").is_ok());
        assert!(analyze("func x():\n  pasar\nfin\nfunc g():\n  func x():\n    pasar\n  fin\nfin").is_ok());
    }

    #[test]
    fn reassignment_in_same_scope_ok() {
        assert!(analyze("var x = 1\nx = x + 1").is_ok());
    }

    #[test]
    fn unknown_name_fails() {
        assert_eq!(analyze("imprimir(y)").unwrap_err(), SemanticError::NameError { name: "y".into() });
        assert_eq!(analyze("z()").unwrap_err(), SemanticError::NameError { name: "z".into() });
    }

    #[test]
    fn inheritance_checks() {
        assert!(analyze("clase A:\nfin\nclase B(A):\nfin").is_ok());
        assert!(matches!(analyze("clase B(A):\nfin"), Err(SemanticError::NameError { .. })));
        assert!(matches!(analyze("var A = 1\nclase B(A):\nfin"), Err(SemanticError::UnknownBase { .. })));
        assert!(matches!(analyze("clase A(A):\nfin"), Err(SemanticError::InheritanceCycle { .. })));
        let cyclic = "clase A:\nfin\nclase B(A):\nfin\nfunc f():\n  clase A(B):\n  fin\nfin";
        assert_eq!(
            analyze(cyclic).unwrap_err(),
            SemanticError::InheritanceCycle { class: "A".into(), base: "B".into() }
        );
    }

    #[test]
    fn guard_termination_is_hard_error() {
        let src = "func f(x):\n  garantia x:\n    pasar\n  sino:\n    imprimir(x)\n  fin\nfin";
        assert_eq!(analyze(src).unwrap_err(), SemanticError::UnprovenGuard);
    }

    #[test]
    fn bound_names_are_scoped() {
        assert!(analyze("v = [x para x in rango(3)]").is_ok());
        assert!(matches!(analyze("v = [x para x in rango(3)]\nimprimir(x)"), Err(SemanticError::NameError { .. })));
        assert!(analyze("para i in rango(3):\n  pasar\nfin\nimprimir(i)").is_ok());
        assert!(analyze("f = lambda a: a + 1").is_ok());
    }

    #[test]
    fn methods_see_params_and_self() {
        let src = "clase P:\n  metodo inicializar(self, x):\n    self.x = x\n  fin\nfin\np = P(1)";
        assert!(analyze(src).is_ok());
    }

    #[test]
    fn duplicate_parameter_in_handbuilt_ast() {
        let f = Node::Function(FunctionDef {
            name: "f".into(),
            params: vec!["a".into(), "a".into()],
            body: vec![],
            decorators: vec![],
            is_async: false,
            type_params: vec![],
        });
        let err = SemanticAnalyzer::new().analyze(&[f]).unwrap_err();
        assert_eq!(err, SemanticError::DuplicateParameter { name: "a".into() });
    }

    #[test]
    fn import_without_resolver_binds_from_names() {
        assert!(analyze("import \"util\"\ndesde \"util\" import suma como s\nimprimir(s(1))").is_ok());
    }
}
