//! Double dispatch over [`Node`].
//!
//! `Node::accept` matches every variant and calls the hook for its kind.
//! Kinds without a dedicated hook, and every hook left at its default, go
//! through [`Visitor::generic_visit`], which walks [`Node::children`].

use crate::core::ast::{Case, ClassDef, FunctionDef, MethodDef, Node, Target};

pub trait Visitor {
    type Error;

    /// Fallback traversal: visits every nested node in field order.
    fn generic_visit(&mut self, node: &Node) -> Result<(), Self::Error> {
        for child in node.children() {
            child.accept(self)?;
        }
        Ok(())
    }

    fn visit_block(&mut self, block: &[Node]) -> Result<(), Self::Error> {
        for stmt in block {
            stmt.accept(self)?;
        }
        Ok(())
    }

    fn visit_assignment(&mut self, node: &Node, _target: &Target, _value: &Node) -> Result<(), Self::Error> {
        self.generic_visit(node)
    }

    fn visit_identifier(&mut self, _name: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_function(&mut self, node: &Node, _func: &FunctionDef) -> Result<(), Self::Error> {
        self.generic_visit(node)
    }

    fn visit_method(&mut self, node: &Node, _method: &MethodDef) -> Result<(), Self::Error> {
        self.generic_visit(node)
    }

    fn visit_class(&mut self, node: &Node, _class: &ClassDef) -> Result<(), Self::Error> {
        self.generic_visit(node)
    }

    fn visit_guard(&mut self, node: &Node, _cond: &Node, _body: &[Node], _escape: &[Node]) -> Result<(), Self::Error> {
        self.generic_visit(node)
    }

    fn visit_for(&mut self, node: &Node, _var: &str, _iterable: &Node, _body: &[Node]) -> Result<(), Self::Error> {
        self.generic_visit(node)
    }

    fn visit_lambda(&mut self, node: &Node, _params: &[String], _body: &Node) -> Result<(), Self::Error> {
        self.generic_visit(node)
    }

    /// List and dict comprehensions. `parts` are the produced expressions
    /// (one for lists, key and value for dicts).
    fn visit_comprehension(
        &mut self,
        node: &Node,
        _parts: &[&Node],
        _var: &str,
        _iterable: &Node,
        _cond: Option<&Node>,
    ) -> Result<(), Self::Error> {
        self.generic_visit(node)
    }

    fn visit_try(
        &mut self,
        node: &Node,
        _body: &[Node],
        _catch_name: Option<&str>,
        _catch_block: &[Node],
        _finally_block: &[Node],
    ) -> Result<(), Self::Error> {
        self.generic_visit(node)
    }

    fn visit_with(&mut self, node: &Node, _context: &Node, _alias: Option<&str>, _body: &[Node]) -> Result<(), Self::Error> {
        self.generic_visit(node)
    }

    fn visit_switch(&mut self, node: &Node, _subject: &Node, _cases: &[Case], _default: &[Node]) -> Result<(), Self::Error> {
        self.generic_visit(node)
    }

    fn visit_import(&mut self, _node: &Node, _path: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_import_from(&mut self, _node: &Node, _module: &str, _name: &str, _alias: Option<&str>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_scope_names(&mut self, _node: &Node, _names: &[String]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_type_decl(&mut self, _node: &Node, _name: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_call(&mut self, node: &Node, _callee: &str, _args: &[Node]) -> Result<(), Self::Error> {
        self.generic_visit(node)
    }

    fn visit_macro(&mut self, node: &Node, _name: &str, _body: &[Node]) -> Result<(), Self::Error> {
        self.generic_visit(node)
    }

    /// Typed list and dict declarations.
    fn visit_typed_collection(&mut self, node: &Node, _name: &str) -> Result<(), Self::Error> {
        self.generic_visit(node)
    }
}

impl Node {
    /// Dispatches to the visitor hook for this node's kind.
    pub fn accept<V: Visitor + ?Sized>(&self, v: &mut V) -> Result<(), V::Error> {
        match self {
            Node::Assignment { target, value, .. } => v.visit_assignment(self, target, value),
            Node::Identifier(name) => v.visit_identifier(name),
            Node::Function(f) => v.visit_function(self, f),
            Node::Method(m) => v.visit_method(self, m),
            Node::Class(c) => v.visit_class(self, c),
            Node::Guard { cond, body, escape } => v.visit_guard(self, cond, body, escape),
            Node::For { var, iterable, body, .. } => v.visit_for(self, var, iterable, body),
            Node::Lambda { params, body } => v.visit_lambda(self, params, body),
            Node::ListComprehension { expr, var, iterable, cond } => {
                v.visit_comprehension(self, &[expr.as_ref()], var, iterable, cond.as_deref())
            }
            Node::DictComprehension { key, value, var, iterable, cond } => {
                v.visit_comprehension(self, &[key.as_ref(), value.as_ref()], var, iterable, cond.as_deref())
            }
            Node::TryCatch { body, catch_name, catch_block, finally_block } => {
                v.visit_try(self, body, catch_name.as_deref(), catch_block, finally_block)
            }
            Node::With { context, alias, body } => v.visit_with(self, context, alias.as_deref(), body),
            Node::Switch { subject, cases, default } => v.visit_switch(self, subject, cases, default),
            Node::Import { path } => v.visit_import(self, path),
            Node::Use { module } => v.visit_import(self, module),
            Node::ImportFrom { module, name, alias } => v.visit_import_from(self, module, name, alias.as_deref()),
            Node::Global(names) | Node::NonLocal(names) => v.visit_scope_names(self, names),
            Node::Enum { name, .. } | Node::Interface { name, .. } => v.visit_type_decl(self, name),
            Node::Call { callee, args } => v.visit_call(self, callee, args),
            Node::Macro { name, body } => v.visit_macro(self, name, body),
            Node::TypedList { name, .. } | Node::TypedDict { name, .. } => v.visit_typed_collection(self, name),
            Node::Conditional { .. }
            | Node::While { .. }
            | Node::Return(_)
            | Node::Yield(_)
            | Node::Throw(_)
            | Node::Export { .. }
            | Node::Print(_)
            | Node::Thread(_)
            | Node::Break
            | Node::Continue
            | Node::Pass
            | Node::Assert { .. }
            | Node::Del(_)
            | Node::Defer(_)
            | Node::Decorator(_)
            | Node::Value(_)
            | Node::Binary { .. }
            | Node::Unary { .. }
            | Node::Await(_)
            | Node::MethodCall { .. }
            | Node::Attribute { .. }
            | Node::Instance { .. }
            | Node::Option(_)
            | Node::List(_)
            | Node::Dict(_)
            | Node::Holobit { .. } => v.generic_visit(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ast::BinaryOp;

    struct Names(Vec<String>);

    impl Visitor for Names {
        type Error = ();
        fn visit_identifier(&mut self, name: &str) -> Result<(), ()> {
            self.0.push(name.to_string());
            Ok(())
        }
    }

    #[test]
    fn generic_visit_reaches_nested_identifiers() {
        let tree = Node::While {
            cond: Box::new(Node::binary(Node::ident("a"), BinaryOp::Lt, Node::ident("b"))),
            body: vec![Node::Print(vec![Node::ident("c")])],
        };
        let mut v = Names(Vec::new());
        tree.accept(&mut v).unwrap();
        assert_eq!(v.0, vec!["a", "b", "c"]);
    }
}
