//! Inlines trivial top-level functions.
//!
//! A function qualifies when it is declared once at the top level, carries no
//! decorators, is neither async nor a generator, its name is never rebound,
//! and its body is a single `retorno e` where `e` is an operator tree over its
//! parameters and literals. Calls with matching arity whose arguments are all
//! literals or identifiers are replaced by `e` with the arguments substituted.
//! Only calls in top-level statements after the definition are touched; an
//! earlier call must still fail on the undefined name. The definition goes
//! away once nothing refers to it.

use std::collections::{HashMap, HashSet};

use crate::core::ast::{body_contains_yield, FunctionDef, Node, Target};
use crate::core::optimizer::OptimizationStats;

pub(super) fn inline_program(program: &mut Vec<Node>, stats: &mut OptimizationStats) -> bool {
    let candidates = candidates(program);
    if candidates.is_empty() {
        return false;
    }
    let mut changed = false;
    for (at, stmt) in program.iter_mut().enumerate() {
        changed |= inline_calls(stmt, at, &candidates, stats);
    }

    let before = program.len();
    let mut refs = HashSet::new();
    for stmt in program.iter() {
        referenced_names(stmt, &mut refs);
    }
    program.retain(|stmt| match stmt {
        Node::Function(f) if candidates.contains_key(&f.name) => refs.contains(&f.name),
        _ => true,
    });
    let removed = before - program.len();
    if removed > 0 {
        tracing::trace!(removed, "inlined functions dropped");
        stats.functions_removed += removed as u32;
        changed = true;
    }
    changed
}

/// Marker for statements that can bind names we cannot see.
const ANY_NAME: &str = "*";

struct Inlinable {
    /// Top-level index of the definition.
    index: usize,
    params: Vec<String>,
    body: Node,
}

fn candidates(program: &[Node]) -> HashMap<String, Inlinable> {
    let mut defined: HashMap<&str, usize> = HashMap::new();
    for stmt in program {
        if let Node::Function(f) = stmt {
            *defined.entry(f.name.as_str()).or_default() += 1;
        }
    }
    let mut rebound = HashSet::new();
    for stmt in program {
        rebinding_names(stmt, &mut rebound, true);
    }
    if rebound.contains(ANY_NAME) {
        return HashMap::new();
    }

    let mut out = HashMap::new();
    for (index, stmt) in program.iter().enumerate() {
        let Node::Function(f) = stmt else { continue };
        if defined.get(f.name.as_str()) != Some(&1) || rebound.contains(&f.name) {
            continue;
        }
        if let Some(body) = trivial_body(f) {
            out.insert(f.name.clone(), Inlinable { index, params: f.params.clone(), body: body.clone() });
        }
    }
    out
}

fn trivial_body(f: &FunctionDef) -> Option<&Node> {
    if !f.decorators.is_empty() || f.is_async || body_contains_yield(&f.body) {
        return None;
    }
    let [Node::Return(Some(e))] = f.body.as_slice() else {
        return None;
    };
    fn over_params(node: &Node, params: &[String]) -> bool {
        match node {
            Node::Value(_) => true,
            Node::Identifier(n) => params.contains(n),
            Node::Binary { left, right, .. } => over_params(left, params) && over_params(right, params),
            Node::Unary { operand, .. } => over_params(operand, params),
            _ => false,
        }
    }
    over_params(e, &f.params).then_some(&**e)
}

fn inline_calls(
    node: &mut Node,
    at: usize,
    candidates: &HashMap<String, Inlinable>,
    stats: &mut OptimizationStats,
) -> bool {
    let mut changed = false;
    for child in node.children_mut() {
        changed |= inline_calls(child, at, candidates, stats);
    }
    let replacement = match node {
        Node::Call { callee, args } => candidates.get(callee.as_str()).filter(|f| f.index < at).and_then(|f| {
            let pure = args.iter().all(|a| matches!(a, Node::Value(_) | Node::Identifier(_)));
            (pure && args.len() == f.params.len()).then(|| {
                let bindings: HashMap<&str, &Node> = f.params.iter().map(String::as_str).zip(args.iter()).collect();
                substitute(&f.body, &bindings)
            })
        }),
        _ => None,
    };
    if let Some(expr) = replacement {
        *node = expr;
        stats.calls_inlined += 1;
        changed = true;
    }
    changed
}

fn substitute(body: &Node, bindings: &HashMap<&str, &Node>) -> Node {
    match body {
        Node::Identifier(n) => bindings.get(n.as_str()).map_or_else(|| body.clone(), |arg| (*arg).clone()),
        other => {
            let mut out = other.clone();
            for child in out.children_mut() {
                *child = substitute(child, bindings);
            }
            out
        }
    }
}

/// Names a statement binds anywhere in the program, parameters included.
/// Top-level function definitions are counted separately.
fn rebinding_names(node: &Node, out: &mut HashSet<String>, top_level: bool) {
    match node {
        Node::Assignment { target: Target::Name(n), .. } => {
            out.insert(n.clone());
        }
        Node::For { var, .. } | Node::ListComprehension { var, .. } | Node::DictComprehension { var, .. } => {
            out.insert(var.clone());
        }
        Node::Function(f) => {
            if !top_level {
                out.insert(f.name.clone());
            }
            out.extend(f.params.iter().cloned());
        }
        Node::Method(m) => {
            out.insert(m.name.clone());
            out.extend(m.params.iter().cloned());
        }
        Node::Class(c) => {
            out.insert(c.name.clone());
            for m in &c.methods {
                out.extend(m.params.iter().cloned());
            }
        }
        Node::Lambda { params, .. } => out.extend(params.iter().cloned()),
        Node::Enum { name, .. }
        | Node::Interface { name, .. }
        | Node::Macro { name, .. }
        | Node::TypedList { name, .. }
        | Node::TypedDict { name, .. } => {
            out.insert(name.clone());
        }
        Node::TryCatch { catch_name: Some(n), .. } | Node::With { alias: Some(n), .. } => {
            out.insert(n.clone());
        }
        Node::ImportFrom { name, alias, .. } => {
            out.insert(alias.clone().unwrap_or_else(|| name.clone()));
        }
        // modules run in the importing context and may define anything
        Node::Import { .. } | Node::Use { .. } => {
            out.insert(ANY_NAME.into());
        }
        Node::Del(target) => {
            if let Node::Identifier(n) = target.as_ref() {
                out.insert(n.clone());
            }
        }
        Node::Switch { cases, .. } => {
            for case in cases {
                out.extend(case.pattern.bindings().into_iter().map(str::to_string));
            }
        }
        _ => {}
    }
    for child in node.children() {
        rebinding_names(child, out, false);
    }
}

fn referenced_names(node: &Node, out: &mut HashSet<String>) {
    match node {
        Node::Identifier(n) | Node::Call { callee: n, .. } | Node::Export { name: n } => {
            out.insert(n.clone());
        }
        _ => {}
    }
    for child in node.children() {
        referenced_names(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ast::BinaryOp;
    use crate::core::parser::parse_source;

    fn run(src: &str) -> Vec<Node> {
        let mut program = parse_source(src).unwrap().program;
        inline_program(&mut program, &mut OptimizationStats::default());
        program
    }

    #[test]
    fn trivial_function_is_inlined_and_dropped() {
        let out = run("func doble(x):\n  retorno x * 2\nfin\nimprimir(doble(a))");
        assert_eq!(out, vec![Node::Print(vec![Node::binary(Node::ident("a"), BinaryOp::Mul, Node::int(2))])]);
    }

    #[test]
    fn impure_arguments_keep_the_call() {
        let out = run("func doble(x):\n  retorno x * 2\nfin\nimprimir(doble(f(1)))");
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0], Node::Function(_)));
    }

    #[test]
    fn definition_survives_other_references() {
        let out = run("func uno():\n  retorno 1\nfin\nimprimir(uno())\ng = uno");
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], Node::Print(vec![Node::int(1)]));
    }

    #[test]
    fn rebound_or_shadowed_names_are_skipped() {
        let src = "func uno():\n  retorno 1\nfin\nuno = 2\nimprimir(uno())";
        assert_eq!(run(src), parse_source(src).unwrap().program);
        let src = "func uno():\n  retorno 1\nfin\nfunc g(uno):\n  retorno uno()\nfin";
        assert_eq!(run(src), parse_source(src).unwrap().program);
    }

    #[test]
    fn calls_before_the_definition_are_left_alone() {
        let src = "imprimir(doble(2))\nfunc doble(x):\n  retorno x * 2\nfin";
        assert_eq!(run(src), parse_source(src).unwrap().program);

        let out = run("imprimir(doble(1))\nfunc doble(x):\n  retorno x * 2\nfin\nimprimir(doble(3))");
        assert_eq!(out.len(), 3);
        assert!(matches!(&out[1], Node::Function(_)));
        assert_eq!(out[2], Node::Print(vec![Node::binary(Node::int(3), BinaryOp::Mul, Node::int(2))]));
    }

    #[test]
    fn recursive_and_multi_statement_bodies_are_kept() {
        let src = "func f(n):\n  retorno f(n)\nfin\nfunc g(n):\n  imprimir(n)\n  retorno n\nfin\nf(1)\ng(2)";
        assert_eq!(run(src), parse_source(src).unwrap().program);
    }
}
