//! AST → AST optimization passes.
//!
//! Pass order per round: constant folding → common-subexpression
//! elimination → inlining → dead-code elimination. Rounds repeat until no
//! pass reports a change (bounded by [`MAX_ROUNDS`]), so running `optimize`
//! on its own output is a no-op.

mod common_subexpr;
mod constant_folding;
mod dead_code;
mod inliner;

use serde::Serialize;

use crate::core::ast::Node;

pub use common_subexpr::{is_temporary, TEMP_PREFIX};

pub const MAX_ROUNDS: usize = 16;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OptimizationStats {
    pub constants_folded: u32,
    pub subexpressions_shared: u32,
    pub calls_inlined: u32,
    pub functions_removed: u32,
    pub statements_removed: u32,
    pub branches_collapsed: u32,
    pub rounds: u32,
}

pub fn optimize(program: Vec<Node>) -> Vec<Node> {
    optimize_with_stats(program).0
}

pub fn optimize_with_stats(mut program: Vec<Node>) -> (Vec<Node>, OptimizationStats) {
    let mut stats = OptimizationStats::default();
    for _ in 0..MAX_ROUNDS {
        stats.rounds += 1;
        let mut changed = false;
        changed |= constant_folding::fold_program(&mut program, &mut stats);
        changed |= common_subexpr::eliminate(&mut program, &mut stats);
        changed |= inliner::inline_program(&mut program, &mut stats);
        changed |= dead_code::eliminate(&mut program, &mut stats);
        if !changed {
            break;
        }
    }
    tracing::trace!(?stats, "optimizer finished");
    (program, stats)
}

/// Applies `f` to every statement list in `block`, innermost first.
pub(crate) fn for_each_block(block: &mut Vec<Node>, f: &mut dyn FnMut(&mut Vec<Node>) -> bool) -> bool {
    let mut changed = false;
    for stmt in block.iter_mut() {
        changed |= for_each_nested(stmt, f);
    }
    changed |= f(block);
    changed
}

pub(crate) fn for_each_nested(node: &mut Node, f: &mut dyn FnMut(&mut Vec<Node>) -> bool) -> bool {
    let mut changed = false;
    let blocks = node.blocks_mut();
    if blocks.is_empty() {
        // `defer` and `hilo` wrap a statement that may own blocks
        for child in node.children_mut() {
            changed |= for_each_nested(child, f);
        }
        return changed;
    }
    for block in blocks {
        changed |= for_each_block(block, f);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_source;

    fn opt(src: &str) -> Vec<Node> {
        optimize(parse_source(src).unwrap().program)
    }

    #[test]
    fn idempotent_on_mixed_program() {
        let src = "func doble(x):\n  retorno x * 2\nfin\nvar a = 3\nvar b = doble(a) + (a * a) + (a * a)\nsi verdadero:\n  imprimir(b)\nsino:\n  imprimir(0)\nfin\nmientras falso:\n  imprimir(1)\nfin";
        let once = opt(src);
        let twice = optimize(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn stats_count_work_done() {
        let program = parse_source("var x = 1 + 2\nsi falso:\n  imprimir(x)\nfin").unwrap().program;
        let (out, stats) = optimize_with_stats(program);
        assert_eq!(out, vec![Node::Assignment {
            target: crate::core::ast::Target::Name("x".into()),
            value: Box::new(Node::int(3)),
            inferred: false,
        }]);
        assert_eq!(stats.constants_folded, 1);
        assert_eq!(stats.branches_collapsed, 1);
        assert!(stats.rounds >= 2);
    }

    #[test]
    fn already_optimal_program_takes_one_round() {
        let program = parse_source("var x = y\nimprimir(x)").unwrap().program;
        let (out, stats) = optimize_with_stats(program.clone());
        assert_eq!(out, program);
        assert_eq!(stats.rounds, 1);
    }
}
