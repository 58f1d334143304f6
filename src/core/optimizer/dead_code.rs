//! Dead-code elimination.
//!
//! - statements after `retorno` / `lanzar` / `romper` / `continuar` (or a
//!   branch where every path ends in one) are dropped;
//! - `si` on a literal condition collapses into the taken branch. `garantia`
//!   is left alone so the analyzer still sees its escape branch;
//! - `mientras` on a falsy literal disappears;
//! - `_cseN` temporaries nobody reads are dropped. User bindings are never
//!   considered unused since imports and threads can observe them.

use std::collections::HashSet;

use crate::core::ast::{block_terminates, Node, Target};
use crate::core::interpreter::value::Value;
use crate::core::optimizer::{for_each_block, is_temporary, OptimizationStats};

pub(super) fn eliminate(program: &mut Vec<Node>, stats: &mut OptimizationStats) -> bool {
    let mut changed = false;
    for stmt in program.iter_mut() {
        changed |= simplify_nested(stmt, stats);
    }
    changed |= simplify_block(program, stats, true);

    let mut read = HashSet::new();
    for stmt in program.iter() {
        read_temporaries(stmt, &mut read);
    }
    changed |= for_each_block(program, &mut |block| {
        let before = block.len();
        block.retain(|stmt| match stmt {
            Node::Assignment { target: Target::Name(n), .. } if is_temporary(n) => read.contains(n),
            _ => true,
        });
        let removed = before - block.len();
        stats.statements_removed += removed as u32;
        removed > 0
    });
    changed
}

/// Simplifies every block below `node`, innermost first. Guards are skipped
/// whole: cutting code inside one could make an escape look terminating.
fn simplify_nested(node: &mut Node, stats: &mut OptimizationStats) -> bool {
    if matches!(node, Node::Guard { .. }) {
        return false;
    }
    let mut changed = false;
    let blocks = node.blocks_mut();
    if blocks.is_empty() {
        for child in node.children_mut() {
            changed |= simplify_nested(child, stats);
        }
        return changed;
    }
    for block in blocks {
        for stmt in block.iter_mut() {
            changed |= simplify_nested(stmt, stats);
        }
        changed |= simplify_block(block, stats, false);
    }
    changed
}

fn literal_truth(cond: &Node) -> Option<bool> {
    match cond {
        Node::Value(lit) => Some(Value::from_literal(lit).is_truthy()),
        _ => None,
    }
}

/// Splicing a branch into the program would turn its expression statements
/// into top-level results, so `top_level` keeps those branches intact.
fn simplify_block(block: &mut Vec<Node>, stats: &mut OptimizationStats, top_level: bool) -> bool {
    let spliceable = |branch: &[Node]| !top_level || !branch.iter().any(Node::is_expression);
    let mut changed = false;
    let mut out = Vec::with_capacity(block.len());
    for stmt in block.drain(..) {
        match stmt {
            Node::Conditional { cond, then_block, else_block }
                if literal_truth(&cond).is_some_and(|t| spliceable(if t { then_block.as_slice() } else { else_block.as_slice() })) =>
            {
                let taken = if literal_truth(&cond) == Some(true) { then_block } else { else_block };
                out.extend(taken);
                stats.branches_collapsed += 1;
                changed = true;
            }
            Node::While { cond, .. } if literal_truth(&cond) == Some(false) => {
                stats.statements_removed += 1;
                changed = true;
            }
            other => out.push(other),
        }
    }

    if let Some(end) = (0..out.len()).find(|&i| block_terminates(&out[..=i])) {
        let dropped = out.len() - (end + 1);
        if dropped > 0 {
            out.truncate(end + 1);
            stats.statements_removed += dropped as u32;
            changed = true;
        }
    }
    *block = out;
    changed
}

fn read_temporaries(node: &Node, out: &mut HashSet<String>) {
    if let Node::Identifier(n) = node {
        if is_temporary(n) {
            out.insert(n.clone());
        }
    }
    for child in node.children() {
        read_temporaries(child, out);
    }
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
    fn code_after_return_is_dropped() {
        let out = run("func f():\n  retorno 1\n  imprimir(2)\nfin");
        match &out[0] {
            Node::Function(f) => assert_eq!(f.body, vec![Node::ret(Some(Node::int(1)))]),
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn literal_conditions_collapse() {
        let out = run("si falso:\n  imprimir(1)\nsino:\n  imprimir(2)\nfin\nmientras 0:\n  imprimir(3)\nfin");
        assert_eq!(out, vec![Node::Print(vec![Node::int(2)])]);
    }

    #[test]
    fn unread_temporaries_go_user_bindings_stay() {
        let out = run("_cse0 = a + 1\nsin_uso = a + 1");
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Node::Assignment { target: Target::Name(n), .. } if n == "sin_uso"));
    }

    #[test]
    fn guards_on_literals_are_kept() {
        let src = "func f():\n  garantia verdadero:\n    imprimir(1)\n  sino:\n    imprimir(2)\n  fin\nfin";
        assert_eq!(run(src), parse_source(src).unwrap().program);
        let src = "func f(x):\n  garantia x:\n    pasar\n  sino:\n    si verdadero:\n      retorno 1\n    fin\n    imprimir(2)\n  fin\nfin";
        assert_eq!(run(src), parse_source(src).unwrap().program);
    }

    #[test]
    fn top_level_branches_with_results_stay() {
        let src = "si verdadero:\n  f()\nfin";
        assert_eq!(run(src), parse_source(src).unwrap().program);
        let out = run("func g():\n  si verdadero:\n    f()\n  fin\nfin");
        match &out[0] {
            Node::Function(f) => assert_eq!(f.body, vec![Node::call("f", vec![])]),
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn terminating_conditional_cuts_the_rest() {
        let out = run("mientras x:\n  si y:\n    romper\n  sino:\n    continuar\n  fin\n  imprimir(1)\nfin");
        match &out[0] {
            Node::While { body, .. } => assert_eq!(body.len(), 1),
            other => panic!("unexpected node {:?}", other),
        }
    }
}
