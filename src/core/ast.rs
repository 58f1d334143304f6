// src/core/ast.rs
//! Abstract Syntax Tree definitions for Cobra.
//!
//! Nodes are plain data. Traversal goes through [`Node::accept`] (see
//! `core::visitor`) or the structural helpers [`Node::children`],
//! [`Node::children_mut`] and [`Node::blocks_mut`].

use serde::Serialize;
use std::fmt;

use crate::core::keywords;
use crate::core::token::TokenKind;

pub type Block = Vec<Node>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{:?}", x),
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::Bool(b) => write!(f, "{}", if *b { "verdadero" } else { "falso" }),
            Literal::Null => write!(f, "nulo"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOp {
    Add, Sub, Mul, Div, Mod,
    Eq, Ne, Lt, Le, Gt, Ge,
    And, Or,
}

impl BinaryOp {
    pub fn from_token(kind: &TokenKind) -> Option<Self> {
        use BinaryOp::*;
        Some(match kind {
            TokenKind::Plus => Add,
            TokenKind::Minus => Sub,
            TokenKind::Star => Mul,
            TokenKind::Slash => Div,
            TokenKind::Percent => Mod,
            TokenKind::DoubleEquals => Eq,
            TokenKind::NotEquals => Ne,
            TokenKind::LessThan => Lt,
            TokenKind::LessEqual => Le,
            TokenKind::GreaterThan => Gt,
            TokenKind::GreaterEqual => Ge,
            TokenKind::AndAnd => And,
            TokenKind::OrOr => Or,
            _ => return None,
        })
    }

    /// Comparisons may dispatch to `__eq__` / `__lt__` on instances.
    pub fn is_comparison(self) -> bool {
        use BinaryOp::*;
        matches!(self, Eq | Ne | Lt | Le | Gt | Ge)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinaryOp::*;
        let s = match self {
            Add => "+", Sub => "-", Mul => "*", Div => "/", Mod => "%",
            Eq => "==", Ne => "!=", Lt => "<", Le => "<=", Gt => ">", Ge => ">=",
            And => "&&", Or => "||",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", match self { UnaryOp::Not => "!", UnaryOp::Neg => "-" })
    }
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Target {
    Name(String),
    Attribute { object: Box<Node>, name: String },
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Name(n) => n,
            Target::Attribute { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub decorators: Vec<Node>,
    pub is_async: bool,
    pub type_params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodDef {
    /// Normalized name (special names already mapped).
    pub name: String,
    /// Spelling used in the source when it differs from `name`.
    pub original_name: Option<String>,
    pub params: Vec<String>,
    pub body: Block,
    pub is_async: bool,
    pub type_params: Vec<String>,
}

impl MethodDef {
    /// Builds a method, mapping `name` through the special-method alias table.
    pub fn new(name: &str, params: Vec<String>, body: Block) -> Self {
        let normalized = keywords::normalize_method_name(name);
        MethodDef {
            name: normalized.to_string(),
            original_name: (normalized != name).then(|| name.to_string()),
            params,
            body,
            is_async: false,
            type_params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<String>,
    pub methods: Vec<MethodDef>,
    pub type_params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbstractMethod {
    pub name: String,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Pattern {
    Wildcard,
    Literal(Literal),
    Binding(String),
    Tuple(Vec<Pattern>),
}

impl Pattern {
    pub fn bindings(&self) -> Vec<&str> {
        match self {
            Pattern::Binding(n) => vec![n.as_str()],
            Pattern::Tuple(items) => items.iter().flat_map(|p| p.bindings()).collect(),
            Pattern::Wildcard | Pattern::Literal(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Case {
    pub pattern: Pattern,
    pub guard: Option<Node>,
    pub body: Block,
}

/// Represents nodes in the Abstract Syntax Tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Node {
    // Statements
    Assignment { target: Target, value: Box<Node>, inferred: bool },
    Conditional { cond: Box<Node>, then_block: Block, else_block: Block },
    Guard { cond: Box<Node>, body: Block, escape: Block },
    While { cond: Box<Node>, body: Block },
    For { var: String, iterable: Box<Node>, body: Block, is_async: bool },
    Function(FunctionDef),
    Method(MethodDef),
    Class(ClassDef),
    Enum { name: String, members: Vec<String> },
    Interface { name: String, methods: Vec<AbstractMethod> },
    Return(Option<Box<Node>>),
    Yield(Option<Box<Node>>),
    Throw(Box<Node>),
    TryCatch { body: Block, catch_name: Option<String>, catch_block: Block, finally_block: Block },
    Import { path: String },
    Use { module: String },
    ImportFrom { module: String, name: String, alias: Option<String> },
    Export { name: String },
    Print(Vec<Node>),
    Thread(Box<Node>),
    Break,
    Continue,
    Pass,
    Assert { cond: Box<Node>, message: Option<Box<Node>> },
    Del(Box<Node>),
    Global(Vec<String>),
    NonLocal(Vec<String>),
    With { context: Box<Node>, alias: Option<String>, body: Block },
    Defer(Box<Node>),
    Switch { subject: Box<Node>, cases: Vec<Case>, default: Block },
    Macro { name: String, body: Block },
    TypedList { name: String, elem_type: String, elements: Vec<Node> },
    TypedDict { name: String, key_type: String, value_type: String, entries: Vec<(Node, Node)> },
    Decorator(Box<Node>),

    // Expressions
    Value(Literal),
    Identifier(String),
    Binary { left: Box<Node>, op: BinaryOp, right: Box<Node> },
    Unary { op: UnaryOp, operand: Box<Node> },
    Await(Box<Node>),
    Call { callee: String, args: Vec<Node> },
    MethodCall { object: Box<Node>, method: String, args: Vec<Node> },
    Attribute { object: Box<Node>, name: String },
    Instance { class_name: String, args: Vec<Node> },
    Lambda { params: Vec<String>, body: Box<Node> },
    Option(Option<Box<Node>>),
    List(Vec<Node>),
    Dict(Vec<(Node, Node)>),
    ListComprehension { expr: Box<Node>, var: String, iterable: Box<Node>, cond: Option<Box<Node>> },
    DictComprehension { key: Box<Node>, value: Box<Node>, var: String, iterable: Box<Node>, cond: Option<Box<Node>> },
    Holobit { name: Option<String>, values: Vec<Node> },
}

impl Node {
    // Utility constructors
    pub fn int(v: i64) -> Self { Node::Value(Literal::Int(v)) }
    pub fn float(v: f64) -> Self { Node::Value(Literal::Float(v)) }
    pub fn string(s: &str) -> Self { Node::Value(Literal::Str(s.to_string())) }
    pub fn boolean(b: bool) -> Self { Node::Value(Literal::Bool(b)) }
    pub fn null() -> Self { Node::Value(Literal::Null) }
    pub fn ident(name: &str) -> Self { Node::Identifier(name.to_string()) }

    pub fn assign(name: &str, value: Node) -> Self {
        Node::Assignment { target: Target::Name(name.to_string()), value: Box::new(value), inferred: false }
    }
    pub fn binary(left: Node, op: BinaryOp, right: Node) -> Self {
        Node::Binary { left: Box::new(left), op, right: Box::new(right) }
    }
    pub fn unary(op: UnaryOp, operand: Node) -> Self {
        Node::Unary { op, operand: Box::new(operand) }
    }
    pub fn call(callee: &str, args: Vec<Node>) -> Self {
        Node::Call { callee: callee.to_string(), args }
    }
    pub fn ret(value: Option<Node>) -> Self {
        Node::Return(value.map(Box::new))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Assignment { .. } => "assignment",
            Node::Conditional { .. } => "conditional",
            Node::Guard { .. } => "guard",
            Node::While { .. } => "while",
            Node::For { .. } => "for",
            Node::Function(_) => "function",
            Node::Method(_) => "method",
            Node::Class(_) => "class",
            Node::Enum { .. } => "enum",
            Node::Interface { .. } => "interface",
            Node::Return(_) => "return",
            Node::Yield(_) => "yield",
            Node::Throw(_) => "throw",
            Node::TryCatch { .. } => "try",
            Node::Import { .. } => "import",
            Node::Use { .. } => "use",
            Node::ImportFrom { .. } => "import_from",
            Node::Export { .. } => "export",
            Node::Print(_) => "print",
            Node::Thread(_) => "thread",
            Node::Break => "break",
            Node::Continue => "continue",
            Node::Pass => "pass",
            Node::Assert { .. } => "assert",
            Node::Del(_) => "del",
            Node::Global(_) => "global",
            Node::NonLocal(_) => "nonlocal",
            Node::With { .. } => "with",
            Node::Defer(_) => "defer",
            Node::Switch { .. } => "switch",
            Node::Macro { .. } => "macro",
            Node::TypedList { .. } => "typed_list",
            Node::TypedDict { .. } => "typed_dict",
            Node::Decorator(_) => "decorator",
            Node::Value(_) => "value",
            Node::Identifier(_) => "identifier",
            Node::Binary { .. } => "binary",
            Node::Unary { .. } => "unary",
            Node::Await(_) => "await",
            Node::Call { .. } => "call",
            Node::MethodCall { .. } => "method_call",
            Node::Attribute { .. } => "attribute",
            Node::Instance { .. } => "instance",
            Node::Lambda { .. } => "lambda",
            Node::Option(_) => "option",
            Node::List(_) => "list",
            Node::Dict(_) => "dict",
            Node::ListComprehension { .. } => "list_comprehension",
            Node::DictComprehension { .. } => "dict_comprehension",
            Node::Holobit { .. } => "holobit",
        }
    }

    /// Every directly nested node, in field order. Statement lists, case
    /// guards and bodies, decorators and dict entries are all included.
    pub fn children(&self) -> Vec<&Node> {
        let mut out: Vec<&Node> = Vec::new();
        match self {
            Node::Assignment { target, value, .. } => {
                if let Target::Attribute { object, .. } = target {
                    out.push(object);
                }
                out.push(value);
            }
            Node::Conditional { cond, then_block, else_block } => {
                out.push(cond);
                out.extend(then_block.iter());
                out.extend(else_block.iter());
            }
            Node::Guard { cond, body, escape } => {
                out.push(cond);
                out.extend(body.iter());
                out.extend(escape.iter());
            }
            Node::While { cond, body } => {
                out.push(cond);
                out.extend(body.iter());
            }
            Node::For { iterable, body, .. } => {
                out.push(iterable);
                out.extend(body.iter());
            }
            Node::Function(f) => {
                out.extend(f.decorators.iter());
                out.extend(f.body.iter());
            }
            Node::Method(m) => out.extend(m.body.iter()),
            Node::Class(c) => {
                for m in &c.methods {
                    out.extend(m.body.iter());
                }
            }
            Node::Return(v) | Node::Yield(v) | Node::Option(v) => {
                if let Some(v) = v {
                    out.push(v);
                }
            }
            Node::Throw(e) | Node::Thread(e) | Node::Del(e) | Node::Defer(e)
            | Node::Decorator(e) | Node::Await(e) => out.push(e),
            Node::TryCatch { body, catch_block, finally_block, .. } => {
                out.extend(body.iter());
                out.extend(catch_block.iter());
                out.extend(finally_block.iter());
            }
            Node::Print(args) | Node::List(args) => out.extend(args.iter()),
            Node::Assert { cond, message } => {
                out.push(cond);
                if let Some(m) = message {
                    out.push(m);
                }
            }
            Node::With { context, body, .. } => {
                out.push(context);
                out.extend(body.iter());
            }
            Node::Switch { subject, cases, default } => {
                out.push(subject);
                for case in cases {
                    if let Some(g) = &case.guard {
                        out.push(g);
                    }
                    out.extend(case.body.iter());
                }
                out.extend(default.iter());
            }
            Node::Macro { body, .. } => out.extend(body.iter()),
            Node::TypedList { elements, .. } => out.extend(elements.iter()),
            Node::TypedDict { entries, .. } | Node::Dict(entries) => {
                for (k, v) in entries {
                    out.push(k);
                    out.push(v);
                }
            }
            Node::Binary { left, right, .. } => {
                out.push(left);
                out.push(right);
            }
            Node::Unary { operand, .. } => out.push(operand),
            Node::Call { args, .. } | Node::Instance { args, .. } => out.extend(args.iter()),
            Node::MethodCall { object, args, .. } => {
                out.push(object);
                out.extend(args.iter());
            }
            Node::Attribute { object, .. } => out.push(object),
            Node::Lambda { body, .. } => out.push(body),
            Node::ListComprehension { expr, iterable, cond, .. } => {
                out.push(expr);
                out.push(iterable);
                if let Some(c) = cond {
                    out.push(c);
                }
            }
            Node::DictComprehension { key, value, iterable, cond, .. } => {
                out.push(key);
                out.push(value);
                out.push(iterable);
                if let Some(c) = cond {
                    out.push(c);
                }
            }
            Node::Holobit { values, .. } => out.extend(values.iter()),
            Node::Enum { .. }
            | Node::Interface { .. }
            | Node::Import { .. }
            | Node::Use { .. }
            | Node::ImportFrom { .. }
            | Node::Export { .. }
            | Node::Break
            | Node::Continue
            | Node::Pass
            | Node::Global(_)
            | Node::NonLocal(_)
            | Node::Value(_)
            | Node::Identifier(_) => {}
        }
        out
    }

    /// Mutable counterpart of [`Node::children`], same order.
    pub fn children_mut(&mut self) -> Vec<&mut Node> {
        let mut out: Vec<&mut Node> = Vec::new();
        match self {
            Node::Assignment { target, value, .. } => {
                if let Target::Attribute { object, .. } = target {
                    out.push(object);
                }
                out.push(value);
            }
            Node::Conditional { cond, then_block, else_block } => {
                out.push(cond);
                out.extend(then_block.iter_mut());
                out.extend(else_block.iter_mut());
            }
            Node::Guard { cond, body, escape } => {
                out.push(cond);
                out.extend(body.iter_mut());
                out.extend(escape.iter_mut());
            }
            Node::While { cond, body } => {
                out.push(cond);
                out.extend(body.iter_mut());
            }
            Node::For { iterable, body, .. } => {
                out.push(iterable);
                out.extend(body.iter_mut());
            }
            Node::Function(f) => {
                out.extend(f.decorators.iter_mut());
                out.extend(f.body.iter_mut());
            }
            Node::Method(m) => out.extend(m.body.iter_mut()),
            Node::Class(c) => {
                for m in &mut c.methods {
                    out.extend(m.body.iter_mut());
                }
            }
            Node::Return(v) | Node::Yield(v) | Node::Option(v) => {
                if let Some(v) = v {
                    out.push(v);
                }
            }
            Node::Throw(e) | Node::Thread(e) | Node::Del(e) | Node::Defer(e)
            | Node::Decorator(e) | Node::Await(e) => out.push(e),
            Node::TryCatch { body, catch_block, finally_block, .. } => {
                out.extend(body.iter_mut());
                out.extend(catch_block.iter_mut());
                out.extend(finally_block.iter_mut());
            }
            Node::Print(args) | Node::List(args) => out.extend(args.iter_mut()),
            Node::Assert { cond, message } => {
                out.push(cond);
                if let Some(m) = message {
                    out.push(m);
                }
            }
            Node::With { context, body, .. } => {
                out.push(context);
                out.extend(body.iter_mut());
            }
            Node::Switch { subject, cases, default } => {
                out.push(subject);
                for case in cases {
                    if let Some(g) = &mut case.guard {
                        out.push(g);
                    }
                    out.extend(case.body.iter_mut());
                }
                out.extend(default.iter_mut());
            }
            Node::Macro { body, .. } => out.extend(body.iter_mut()),
            Node::TypedList { elements, .. } => out.extend(elements.iter_mut()),
            Node::TypedDict { entries, .. } | Node::Dict(entries) => {
                for (k, v) in entries {
                    out.push(k);
                    out.push(v);
                }
            }
            Node::Binary { left, right, .. } => {
                out.push(left);
                out.push(right);
            }
            Node::Unary { operand, .. } => out.push(operand),
            Node::Call { args, .. } | Node::Instance { args, .. } => out.extend(args.iter_mut()),
            Node::MethodCall { object, args, .. } => {
                out.push(object);
                out.extend(args.iter_mut());
            }
            Node::Attribute { object, .. } => out.push(object),
            Node::Lambda { body, .. } => out.push(body),
            Node::ListComprehension { expr, iterable, cond, .. } => {
                out.push(expr);
                out.push(iterable);
                if let Some(c) = cond {
                    out.push(c);
                }
            }
            Node::DictComprehension { key, value, iterable, cond, .. } => {
                out.push(key);
                out.push(value);
                out.push(iterable);
                if let Some(c) = cond {
                    out.push(c);
                }
            }
            Node::Holobit { values, .. } => out.extend(values.iter_mut()),
            Node::Enum { .. }
            | Node::Interface { .. }
            | Node::Import { .. }
            | Node::Use { .. }
            | Node::ImportFrom { .. }
            | Node::Export { .. }
            | Node::Break
            | Node::Continue
            | Node::Pass
            | Node::Global(_)
            | Node::NonLocal(_)
            | Node::Value(_)
            | Node::Identifier(_) => {}
        }
        out
    }

    /// Statement lists owned directly by this node.
    pub fn blocks_mut(&mut self) -> Vec<&mut Block> {
        match self {
            Node::Conditional { then_block, else_block, .. } => vec![then_block, else_block],
            Node::Guard { body, escape, .. } => vec![body, escape],
            Node::While { body, .. } | Node::For { body, .. } | Node::With { body, .. }
            | Node::Macro { body, .. } => vec![body],
            Node::Function(f) => vec![&mut f.body],
            Node::Method(m) => vec![&mut m.body],
            Node::Class(c) => c.methods.iter_mut().map(|m| &mut m.body).collect(),
            Node::TryCatch { body, catch_block, finally_block, .. } => {
                vec![body, catch_block, finally_block]
            }
            Node::Switch { cases, default, .. } => {
                let mut out: Vec<&mut Block> = cases.iter_mut().map(|c| &mut c.body).collect();
                out.push(default);
                out
            }
            _ => Vec::new(),
        }
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children().iter().map(|c| c.count()).sum::<usize>()
    }

    /// True when a `yield` occurs in this subtree outside nested function,
    /// method, class or lambda definitions.
    pub fn contains_yield(&self) -> bool {
        match self {
            Node::Yield(_) => true,
            Node::Function(_) | Node::Method(_) | Node::Class(_) | Node::Lambda { .. } => false,
            other => other.children().into_iter().any(Node::contains_yield),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Node::Value(_))
    }

    /// Expression nodes; used as statements their value is the statement's
    /// result.
    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            Node::Value(_)
                | Node::Identifier(_)
                | Node::Binary { .. }
                | Node::Unary { .. }
                | Node::Await(_)
                | Node::Call { .. }
                | Node::MethodCall { .. }
                | Node::Attribute { .. }
                | Node::Instance { .. }
                | Node::Lambda { .. }
                | Node::Option(_)
                | Node::List(_)
                | Node::Dict(_)
                | Node::ListComprehension { .. }
                | Node::DictComprehension { .. }
                | Node::Holobit { .. }
        )
    }
}

/// Total node count of a program.
pub fn count_nodes(program: &[Node]) -> usize {
    program.iter().map(Node::count).sum()
}

pub fn body_contains_yield(body: &[Node]) -> bool {
    body.iter().any(Node::contains_yield)
}

/// A block terminates when its last statement is `return`, `throw`,
/// `continue` or `break`, a conditional whose two branches both terminate,
/// or a guard whose escape terminates.
pub fn block_terminates(block: &[Node]) -> bool {
    match block.last() {
        Some(stmt) => stmt_terminates(stmt),
        None => false,
    }
}

fn stmt_terminates(stmt: &Node) -> bool {
    match stmt {
        Node::Return(_) | Node::Throw(_) | Node::Continue | Node::Break => true,
        Node::Conditional { then_block, else_block, .. } => {
            !else_block.is_empty() && block_terminates(then_block) && block_terminates(else_block)
        }
        Node::Guard { escape, .. } => block_terminates(escape),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_includes_nested_nodes() {
        let n = Node::assign("x", Node::binary(Node::int(1), BinaryOp::Add, Node::ident("y")));
        assert_eq!(n.count(), 4);
    }

    #[test]
    fn yield_detection_stops_at_nested_functions() {
        let inner = Node::Function(FunctionDef {
            name: "g".into(),
            params: vec![],
            body: vec![Node::Yield(Some(Box::new(Node::int(1))))],
            decorators: vec![],
            is_async: false,
            type_params: vec![],
        });
        assert!(!inner.contains_yield());
        let loop_with_yield = Node::While {
            cond: Box::new(Node::boolean(true)),
            body: vec![Node::Yield(None)],
        };
        assert!(loop_with_yield.contains_yield());
    }

    #[test]
    fn termination_rules() {
        assert!(block_terminates(&[Node::ret(None)]));
        assert!(!block_terminates(&[Node::Pass]));
        let both = Node::Conditional {
            cond: Box::new(Node::ident("c")),
            then_block: vec![Node::Break],
            else_block: vec![Node::Throw(Box::new(Node::int(1)))],
        };
        assert!(block_terminates(&[both]));
        let half = Node::Conditional {
            cond: Box::new(Node::ident("c")),
            then_block: vec![Node::Break],
            else_block: vec![],
        };
        assert!(!block_terminates(&[half]));
    }

    #[test]
    fn method_alias_keeps_original() {
        let m = MethodDef::new("inicializar", vec!["self".into()], vec![]);
        assert_eq!(m.name, "__init__");
        assert_eq!(m.original_name.as_deref(), Some("inicializar"));
        let plain = MethodDef::new("sumar", vec![], vec![]);
        assert_eq!(plain.original_name, None);
    }
}
