//! Common-subexpression elimination.
//!
//! Within one statement list (the program, or a function or method body) a
//! pure operator expression over identifiers and literals that occurs at
//! least twice is computed once into a `_cseN` temporary. Only expressions
//! that are evaluated unconditionally when their statement runs are
//! considered, so hoisting never evaluates something the original program
//! would have skipped. Identifiers the expression reads must not be rebound
//! from the first occurrence on.
//!
//! The temporary is bound in front of the statement holding the first
//! occurrence, so that statement may evaluate nothing observable before the
//! occurrence: only literals, lambdas and identifiers the expression reads
//! itself. Comparisons are never shared since they can call `__eq__` or
//! `__lt__` on instances.

use std::collections::HashSet;

use crate::core::ast::{BinaryOp, Node, Target};
use crate::core::optimizer::OptimizationStats;

pub const TEMP_PREFIX: &str = "_cse";

pub fn is_temporary(name: &str) -> bool {
    name.strip_prefix(TEMP_PREFIX).is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

pub(super) fn eliminate(program: &mut Vec<Node>, stats: &mut OptimizationStats) -> bool {
    let mut ctx = Cse { shared: shared_names(program), next: next_temp_index(program) };
    let mut changed = ctx.run_list(program, stats);
    for stmt in program.iter_mut() {
        changed |= ctx.run_nested(stmt, stats);
    }
    changed
}

struct Cse {
    /// Names some other body can rebind: `global` / `nolocal` targets and
    /// anything a macro body assigns.
    shared: HashSet<String>,
    next: usize,
}

impl Cse {
    fn run_nested(&mut self, node: &mut Node, stats: &mut OptimizationStats) -> bool {
        let mut changed = false;
        match node {
            Node::Function(f) => changed |= self.run_list(&mut f.body, stats),
            Node::Method(m) => changed |= self.run_list(&mut m.body, stats),
            Node::Class(c) => {
                for m in &mut c.methods {
                    changed |= self.run_list(&mut m.body, stats);
                }
            }
            _ => {}
        }
        for child in node.children_mut() {
            changed |= self.run_nested(child, stats);
        }
        changed
    }

    fn run_list(&mut self, list: &mut Vec<Node>, stats: &mut OptimizationStats) -> bool {
        let mut changed = false;
        while let Some((expr, first)) = self.best_candidate(list) {
            let name = format!("{}{}", TEMP_PREFIX, self.next);
            self.next += 1;
            for stmt in &mut list[first..] {
                for root in eager_exprs_mut(stmt) {
                    replace(root, &expr, &name);
                }
            }
            tracing::trace!(temp = name.as_str(), "shared subexpression");
            list.insert(first, Node::Assignment { target: Target::Name(name), value: Box::new(expr), inferred: true });
            stats.subexpressions_shared += 1;
            changed = true;
        }
        changed
    }

    /// Largest repeated candidate and the index of the statement holding its
    /// first occurrence.
    fn best_candidate(&self, list: &[Node]) -> Option<(Node, usize)> {
        let mut seen: Vec<(Node, usize, usize)> = Vec::new();
        for (i, stmt) in list.iter().enumerate() {
            for root in eager_exprs(stmt) {
                collect(root, &mut |e| match seen.iter_mut().find(|(n, _, _)| n == e) {
                    Some(entry) => entry.2 += 1,
                    None => seen.push((e.clone(), i, 1)),
                });
            }
        }
        seen.retain(|(_, _, count)| *count >= 2);
        seen.sort_by_key(|(n, first, _)| (std::cmp::Reverse(n.count()), *first));
        seen.into_iter()
            .find(|(expr, first, _)| self.stable(expr, &list[*first..]) && inert_prefix(&list[*first], expr))
            .map(|(e, first, _)| (e, first))
    }

    fn stable(&self, expr: &Node, rest: &[Node]) -> bool {
        if rest.iter().any(runs_foreign_code) {
            return false;
        }
        let mut rebound = HashSet::new();
        for stmt in rest {
            bound_names(stmt, &mut rebound);
        }
        let mut ok = true;
        visit_idents(expr, &mut |name| ok &= !rebound.contains(name) && !self.shared.contains(name));
        ok
    }
}

/// Pure operator trees over identifiers and literals with at least one
/// identifier. Literal-only trees are constant folding's job.
fn is_candidate(node: &Node) -> bool {
    fn pure(node: &Node) -> bool {
        match node {
            Node::Value(_) | Node::Identifier(_) => true,
            Node::Binary { op, .. } if op.is_comparison() => false,
            Node::Binary { left, right, .. } => pure(left) && pure(right),
            Node::Unary { operand, .. } => pure(operand),
            _ => false,
        }
    }
    let mut has_ident = false;
    visit_idents(node, &mut |_| has_ident = true);
    matches!(node, Node::Binary { .. } | Node::Unary { .. }) && pure(node) && has_ident
}

enum Prefix {
    Found,
    Clear,
    Blocked,
}

/// Whether `stmt` evaluates only inert nodes before reaching `expr`.
fn inert_prefix(stmt: &Node, expr: &Node) -> bool {
    fn walk(node: &Node, expr: &Node, reads: &[String]) -> Prefix {
        if node == expr {
            return Prefix::Found;
        }
        match node {
            Node::Value(_) | Node::Lambda { .. } => Prefix::Clear,
            Node::Identifier(n) if reads.contains(n) => Prefix::Clear,
            Node::Identifier(_) => Prefix::Blocked,
            other => {
                for child in other.children() {
                    match walk(child, expr, reads) {
                        Prefix::Clear => continue,
                        done => return done,
                    }
                }
                // the node's own operation runs before anything after it
                Prefix::Blocked
            }
        }
    }
    let mut reads = Vec::new();
    visit_idents(expr, &mut |name| reads.push(name.to_string()));
    for root in eager_exprs(stmt) {
        match walk(root, expr, &reads) {
            Prefix::Found => return true,
            Prefix::Blocked => return false,
            Prefix::Clear => {}
        }
    }
    false
}

fn visit_idents(node: &Node, f: &mut dyn FnMut(&str)) {
    if let Node::Identifier(name) = node {
        f(name);
    }
    for child in node.children() {
        visit_idents(child, f);
    }
}

/// Expressions a statement evaluates every time it runs, before anything in
/// its nested blocks.
fn eager_exprs(stmt: &Node) -> Vec<&Node> {
    match stmt {
        Node::Assignment { value, .. } => vec![&**value],
        Node::Conditional { cond, .. } | Node::Guard { cond, .. } | Node::Assert { cond, .. } => vec![&**cond],
        Node::For { iterable, .. } => vec![&**iterable],
        Node::Return(Some(e)) | Node::Yield(Some(e)) | Node::Throw(e) => vec![&**e],
        Node::Print(args) | Node::TypedList { elements: args, .. } => args.iter().collect(),
        Node::Switch { subject, .. } => vec![&**subject],
        Node::With { context, .. } => vec![&**context],
        expr if expr.is_expression() => vec![expr],
        _ => Vec::new(),
    }
}

fn eager_exprs_mut(stmt: &mut Node) -> Vec<&mut Node> {
    match stmt {
        Node::Assignment { value, .. } => vec![&mut **value],
        Node::Conditional { cond, .. } | Node::Guard { cond, .. } | Node::Assert { cond, .. } => vec![&mut **cond],
        Node::For { iterable, .. } => vec![&mut **iterable],
        Node::Return(Some(e)) | Node::Yield(Some(e)) | Node::Throw(e) => vec![&mut **e],
        Node::Print(args) | Node::TypedList { elements: args, .. } => args.iter_mut().collect(),
        Node::Switch { subject, .. } => vec![&mut **subject],
        Node::With { context, .. } => vec![&mut **context],
        expr if expr.is_expression() => vec![expr],
        _ => Vec::new(),
    }
}

/// Children evaluated whenever `node` is. Skips the right side of `y` / `o`,
/// lambda bodies and comprehensions.
fn eager_children(node: &Node) -> Vec<&Node> {
    match node {
        Node::Binary { left, op: BinaryOp::And | BinaryOp::Or, .. } => vec![&**left],
        Node::Lambda { .. } | Node::ListComprehension { .. } | Node::DictComprehension { .. } => Vec::new(),
        other => other.children(),
    }
}

fn collect(node: &Node, f: &mut dyn FnMut(&Node)) {
    if is_candidate(node) {
        f(node);
    }
    for child in eager_children(node) {
        collect(child, f);
    }
}

fn replace(node: &mut Node, expr: &Node, name: &str) {
    if *node == *expr {
        *node = Node::Identifier(name.to_string());
        return;
    }
    let skip_right = matches!(node, Node::Binary { op: BinaryOp::And | BinaryOp::Or, .. });
    match node {
        Node::Lambda { .. } | Node::ListComprehension { .. } | Node::DictComprehension { .. } => {}
        Node::Binary { left, .. } if skip_right => replace(left, expr, name),
        other => {
            for child in other.children_mut() {
                replace(child, expr, name);
            }
        }
    }
}

/// Statements that may run code rebinding arbitrary names in this context.
fn runs_foreign_code(stmt: &Node) -> bool {
    match stmt {
        Node::Import { .. } | Node::Use { .. } | Node::ImportFrom { .. } => true,
        Node::Function(_) | Node::Method(_) | Node::Class(_) | Node::Lambda { .. } => false,
        other => other.children().into_iter().any(runs_foreign_code),
    }
}

/// Names `stmt` can bind in the current context.
fn bound_names(stmt: &Node, out: &mut HashSet<String>) {
    match stmt {
        Node::Assignment { target: Target::Name(n), .. } => {
            out.insert(n.clone());
        }
        Node::For { var, .. } => {
            out.insert(var.clone());
        }
        Node::Function(f) => {
            out.insert(f.name.clone());
            return;
        }
        Node::Method(m) => {
            out.insert(m.name.clone());
            return;
        }
        Node::Class(c) => {
            out.insert(c.name.clone());
            return;
        }
        Node::Lambda { .. } => return,
        Node::Enum { name, .. } | Node::Interface { name, .. } | Node::Macro { name, .. } => {
            out.insert(name.clone());
        }
        Node::TypedList { name, .. } | Node::TypedDict { name, .. } => {
            out.insert(name.clone());
        }
        Node::TryCatch { catch_name: Some(n), .. } => {
            out.insert(n.clone());
        }
        Node::With { alias: Some(a), .. } => {
            out.insert(a.clone());
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
    for child in stmt.children() {
        bound_names(child, out);
    }
}

fn shared_names(program: &[Node]) -> HashSet<String> {
    fn walk(node: &Node, out: &mut HashSet<String>) {
        match node {
            Node::Global(names) | Node::NonLocal(names) => out.extend(names.iter().cloned()),
            Node::Macro { body, .. } => {
                for stmt in body {
                    bound_names(stmt, out);
                }
            }
            _ => {}
        }
        for child in node.children() {
            walk(child, out);
        }
    }
    let mut out = HashSet::new();
    for stmt in program {
        walk(stmt, &mut out);
    }
    out
}

/// First free temporary index, so later rounds never reuse a name.
fn next_temp_index(program: &[Node]) -> usize {
    fn walk(node: &Node, max: &mut Option<usize>) {
        if let Node::Assignment { target: Target::Name(n), .. } | Node::Identifier(n) = node {
            if is_temporary(n) {
                if let Ok(i) = n[TEMP_PREFIX.len()..].parse::<usize>() {
                    *max = Some(max.map_or(i, |m| m.max(i)));
                }
            }
        }
        for child in node.children() {
            walk(child, max);
        }
    }
    let mut max = None;
    for stmt in program {
        walk(stmt, &mut max);
    }
    max.map_or(0, |m| m + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_source;

    fn run(src: &str) -> Vec<Node> {
        let mut program = parse_source(src).unwrap().program;
        eliminate(&mut program, &mut OptimizationStats::default());
        program
    }

    #[test]
    fn repeated_expression_gets_a_temporary() {
        let out = run("var a = 2\nimprimir(a * a + 1, a * a)");
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], Node::Assignment {
            target: Target::Name("_cse0".into()),
            value: Box::new(Node::binary(Node::ident("a"), BinaryOp::Mul, Node::ident("a"))),
            inferred: true,
        });
        assert_eq!(
            out[2],
            Node::Print(vec![
                Node::binary(Node::ident("_cse0"), BinaryOp::Add, Node::int(1)),
                Node::ident("_cse0"),
            ])
        );
    }

    #[test]
    fn rebinding_blocks_sharing() {
        let src = "var a = 2\nimprimir(a * a)\na = 3\nimprimir(a * a)";
        assert_eq!(run(src), parse_source(src).unwrap().program);
    }

    #[test]
    fn conditional_occurrences_are_not_hoisted() {
        let src = "si c:\n  imprimir(a / b)\nfin\nimprimir(c o (a / b))";
        assert_eq!(run(src), parse_source(src).unwrap().program);
    }

    #[test]
    fn function_bodies_are_separate_lists() {
        let out = run("func f(a, b):\n  imprimir(a + b)\n  retorno a + b\nfin");
        match &out[0] {
            Node::Function(f) => {
                assert_eq!(f.body.len(), 3);
                assert_eq!(f.body[2], Node::ret(Some(Node::ident("_cse0"))));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn earlier_arguments_keep_their_turn() {
        // `f()` and `x` run before `a / b` in the original order
        for src in [
            "imprimir(f(), a / b, a / b)",
            "imprimir(x, a / b, a / b)",
            "imprimir(a + 1, a / b, a / b)",
        ] {
            assert_eq!(run(src), parse_source(src).unwrap().program, "{}", src);
        }
    }

    #[test]
    fn literal_prefix_still_shares() {
        let out = run("imprimir(\"hola\", a / b, a / b)");
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], Node::Print(vec![Node::string("hola"), Node::ident("_cse0"), Node::ident("_cse0")]));
    }

    #[test]
    fn comparisons_are_not_shared() {
        let src = "imprimir(a == b, a == b)\nimprimir(a < b y (a < b))";
        assert_eq!(run(src), parse_source(src).unwrap().program);
    }

    #[test]
    fn temporaries_are_recognized() {
        assert!(is_temporary("_cse12"));
        assert!(!is_temporary("_cse"));
        assert!(!is_temporary("_csex"));
    }
}
