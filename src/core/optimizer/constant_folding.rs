//! Collapses operators over literals into a single literal.
//!
//! Folding goes through the same value arithmetic the interpreter uses, so a
//! folded program prints exactly what the unfolded one would. Anything that
//! would fail at run time (division by zero, overflow, mixed types) is left
//! in place for the interpreter to report.

use crate::core::ast::{BinaryOp, Literal, Node, UnaryOp};
use crate::core::interpreter::value::{apply_binary, apply_unary, Value};
use crate::core::optimizer::OptimizationStats;

pub(super) fn fold_program(program: &mut [Node], stats: &mut OptimizationStats) -> bool {
    let mut changed = false;
    for node in program.iter_mut() {
        changed |= fold(node, stats);
    }
    changed
}

/// Folds `node` bottom-up.
fn fold(node: &mut Node, stats: &mut OptimizationStats) -> bool {
    let mut changed = false;
    for child in node.children_mut() {
        changed |= fold(child, stats);
    }
    if let Some(lit) = try_fold(node) {
        *node = Node::Value(lit);
        stats.constants_folded += 1;
        changed = true;
    }
    changed
}

fn literal(node: &Node) -> Option<&Literal> {
    match node {
        Node::Value(lit) => Some(lit),
        _ => None,
    }
}

fn try_fold(node: &Node) -> Option<Literal> {
    match node {
        Node::Binary { left, op, right } => {
            let l = Value::from_literal(literal(left)?);
            // `falso y x` and `verdadero o x` never look at `x`
            match (op, l.is_truthy()) {
                (BinaryOp::And, false) => return Some(Literal::Bool(false)),
                (BinaryOp::Or, true) => return Some(Literal::Bool(true)),
                _ => {}
            }
            let r = Value::from_literal(literal(right)?);
            apply_binary(*op, &l, &r).ok()?.to_literal()
        }
        Node::Unary { op, operand } => {
            let v = Value::from_literal(literal(operand)?);
            match op {
                UnaryOp::Not => Some(Literal::Bool(!v.is_truthy())),
                UnaryOp::Neg => apply_unary(*op, &v).ok()?.to_literal(),
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folded(mut node: Node) -> Node {
        let mut stats = OptimizationStats::default();
        fold(&mut node, &mut stats);
        node
    }

    #[test]
    fn nested_arithmetic() {
        let n = Node::binary(Node::int(2), BinaryOp::Mul, Node::binary(Node::int(3), BinaryOp::Add, Node::int(4)));
        assert_eq!(folded(n), Node::int(14));
        let n = Node::binary(Node::int(7), BinaryOp::Div, Node::int(2));
        assert_eq!(folded(n), Node::float(3.5));
        let n = Node::binary(Node::int(-7), BinaryOp::Mod, Node::int(3));
        assert_eq!(folded(n), Node::int(2));
    }

    #[test]
    fn strings_and_comparisons() {
        let n = Node::binary(Node::string("co"), BinaryOp::Add, Node::string("bra"));
        assert_eq!(folded(n), Node::string("cobra"));
        let n = Node::binary(Node::int(1), BinaryOp::Lt, Node::float(1.5));
        assert_eq!(folded(n), Node::boolean(true));
        let n = Node::unary(UnaryOp::Not, Node::string(""));
        assert_eq!(folded(n), Node::boolean(true));
    }

    #[test]
    fn runtime_failures_are_left_alone() {
        let div = Node::binary(Node::int(1), BinaryOp::Div, Node::int(0));
        assert_eq!(folded(div.clone()), div);
        let overflow = Node::binary(Node::int(i64::MAX), BinaryOp::Add, Node::int(1));
        assert_eq!(folded(overflow.clone()), overflow);
        let mixed = Node::binary(Node::string("a"), BinaryOp::Sub, Node::int(1));
        assert_eq!(folded(mixed.clone()), mixed);
    }

    #[test]
    fn short_circuit_ignores_the_right_side() {
        let n = Node::binary(Node::boolean(false), BinaryOp::And, Node::call("f", vec![]));
        assert_eq!(folded(n), Node::boolean(false));
        let n = Node::binary(Node::ident("x"), BinaryOp::And, Node::boolean(true));
        assert_eq!(folded(n.clone()), n);
    }
}
