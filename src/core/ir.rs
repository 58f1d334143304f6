//! Cobra IR (intermediate representation)
//! A small, desugared, deterministic representation of an optimized program,
//! meant for low-level backends. Nothing in the crate executes it.

use std::fmt;

use crate::core::ast::{BinaryOp, UnaryOp};

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub imports: Vec<Import>,
    pub decls: Vec<Decl>, // sorted deterministically by name
}

impl Default for Module {
    fn default() -> Self {
        Self {
            name: "cobra".to_string(),
            imports: Vec::new(),
            decls: Vec::new(),
        }
    }
}

impl Module {
    pub fn decl(&self, name: &str) -> Option<&Decl> {
        self.decls.iter().find(|d| d.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Ord, PartialOrd)]
pub struct Import {
    pub path: String,          // e.g., "util" or "util.doble"
    pub alias: Option<String>, // e.g., "d"
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Const(ConstDecl),
    Fn(FnDecl),
    Class(ClassDecl),
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Const(c) => &c.name,
            Decl::Fn(f) => &f.name,
            Decl::Class(c) => &c.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    pub params: Vec<String>,
    pub is_async: bool,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub bases: Vec<String>,
    pub methods: Vec<FnDecl>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Let {
        name: String,
        value: Expr,
    },
    Assign {
        target: Expr, // Ident or Member
        value: Expr,
    },
    Return(Option<Expr>),
    Yield(Option<Expr>),
    Throw(Expr),
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    For {
        var: String,
        iter: Expr,
        body: Block,
    },
    Try {
        body: Block,
        catch_name: Option<String>,
        catch_block: Block,
        finally_block: Block,
    },
    Break,
    Continue,
    /// Construct with no IR counterpart, kept by kind name.
    Opaque(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Lit),
    Ident(String),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        name: String,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    Array(Vec<Expr>),
    Object(Vec<(Expr, Expr)>),
    Opaque(&'static str),
}

impl Expr {
    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call { callee: Box::new(Expr::Ident(name.to_string())), args }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lit::Null => write!(f, "null"),
            Lit::Bool(b) => write!(f, "{}", b),
            Lit::Int(i) => write!(f, "{}", i),
            Lit::Float(x) => write!(f, "{:?}", x),
            Lit::Str(s) => write!(f, "{:?}", s),
        }
    }
}

// ---------- text form ----------
// Imports first, then declarations in stored order, 2-space indent.

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.name)?;
        for im in &self.imports {
            match &im.alias {
                Some(alias) => writeln!(f, "import {} as {};", im.path, alias)?,
                None => writeln!(f, "import {};", im.path)?,
            }
        }
        for d in &self.decls {
            f.write_str("\n")?;
            write_decl(f, d)?;
        }
        Ok(())
    }
}

fn write_decl(f: &mut fmt::Formatter<'_>, d: &Decl) -> fmt::Result {
    match d {
        Decl::Const(c) => writeln!(f, "const {} = {};", c.name, c.value),
        Decl::Fn(func) => {
            write_fn(f, func, 0)?;
            f.write_str("\n")
        }
        Decl::Class(c) => {
            write!(f, "class {}", c.name)?;
            if !c.bases.is_empty() {
                write!(f, "({})", c.bases.join(", "))?;
            }
            f.write_str(" {\n")?;
            for m in &c.methods {
                indent(f, 2)?;
                write_fn(f, m, 2)?;
                f.write_str("\n")?;
            }
            f.write_str("}\n")
        }
    }
}

fn write_fn(f: &mut fmt::Formatter<'_>, func: &FnDecl, level: usize) -> fmt::Result {
    if func.is_async {
        f.write_str("async ")?;
    }
    write!(f, "fn {}({}) ", func.name, func.params.join(", "))?;
    write_block(f, &func.body, level)
}

fn indent(f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
    write!(f, "{:width$}", "", width = level)
}

fn write_block(f: &mut fmt::Formatter<'_>, b: &Block, level: usize) -> fmt::Result {
    f.write_str("{\n")?;
    for s in &b.stmts {
        write_stmt(f, s, level + 2)?;
    }
    indent(f, level)?;
    f.write_str("}")
}

fn write_stmt(f: &mut fmt::Formatter<'_>, s: &Stmt, level: usize) -> fmt::Result {
    indent(f, level)?;
    match s {
        Stmt::Expr(e) => writeln!(f, "{};", e),
        Stmt::Let { name, value } => writeln!(f, "let {} = {};", name, value),
        Stmt::Assign { target, value } => writeln!(f, "{} = {};", target, value),
        Stmt::Return(None) => writeln!(f, "return;"),
        Stmt::Return(Some(e)) => writeln!(f, "return {};", e),
        Stmt::Yield(None) => writeln!(f, "yield;"),
        Stmt::Yield(Some(e)) => writeln!(f, "yield {};", e),
        Stmt::Throw(e) => writeln!(f, "throw {};", e),
        Stmt::If { cond, then_block, else_block } => {
            write!(f, "if ({}) ", cond)?;
            write_block(f, then_block, level)?;
            if let Some(e) = else_block {
                f.write_str(" else ")?;
                write_block(f, e, level)?;
            }
            f.write_str("\n")
        }
        Stmt::While { cond, body } => {
            write!(f, "while ({}) ", cond)?;
            write_block(f, body, level)?;
            f.write_str("\n")
        }
        Stmt::For { var, iter, body } => {
            write!(f, "for {} in {} ", var, iter)?;
            write_block(f, body, level)?;
            f.write_str("\n")
        }
        Stmt::Try { body, catch_name, catch_block, finally_block } => {
            f.write_str("try ")?;
            write_block(f, body, level)?;
            match catch_name {
                Some(n) => write!(f, " catch ({}) ", n)?,
                None => f.write_str(" catch ")?,
            }
            write_block(f, catch_block, level)?;
            if !finally_block.stmts.is_empty() {
                f.write_str(" finally ")?;
                write_block(f, finally_block, level)?;
            }
            f.write_str("\n")
        }
        Stmt::Break => writeln!(f, "break;"),
        Stmt::Continue => writeln!(f, "continue;"),
        Stmt::Opaque(kind) => writeln!(f, "<{}>;", kind),
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, it) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", it)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lit(l) => write!(f, "{}", l),
            Expr::Ident(s) => f.write_str(s),
            Expr::Call { callee, args } => {
                write!(f, "{}(", callee)?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Expr::Member { object, name } => write!(f, "{}.{}", object, name),
            Expr::Binary { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Unary { op, expr } => write!(f, "{}{}", op, expr),
            Expr::Lambda { params, body } => write!(f, "|{}| {}", params.join(", "), body),
            Expr::Array(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            Expr::Object(fields) => {
                f.write_str("{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Expr::Opaque(kind) => write!(f, "<{}>", kind),
        }
    }
}
