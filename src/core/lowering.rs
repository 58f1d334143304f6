//! Lowering: AST -> IR (desugaring + deterministic ordering)
//!
//! Public entrypoints:
//!   - `lower(&[Node]) -> Module`
//!   - `lower_named(&[Node], name) -> Module`
//!
//! Notes:
//!  * Top-level functions, classes and enums become declarations; every other
//!    top-level statement goes into a synthetic fn `main`, in program order.
//!  * Runtime-only constructs lower to intrinsic calls (`__del(x)`,
//!    `__spawn(|| e)`, `__defer(|| e)`, `__await(e)`).
//!  * Anything without an IR shape degrades to `Opaque(kind)`.

use crate::core::ast::{ClassDef, FunctionDef, Literal, MethodDef, Node, Target, UnaryOp};
use crate::core::ir::*;

pub const ENTRY: &str = "main";

pub fn lower(program: &[Node]) -> Module {
    lower_named(program, &Module::default().name)
}

pub fn lower_named(program: &[Node], name: &str) -> Module {
    let mut imports = Vec::new();
    let mut decls = Vec::new();
    let mut main = Vec::new();

    for node in program {
        match node {
            Node::Function(f) => {
                decls.push(Decl::Fn(lower_fn(f)));
                for dec in f.decorators.iter().rev() {
                    let dec = match dec {
                        Node::Decorator(e) => e.as_ref(),
                        other => other,
                    };
                    main.push(Stmt::Assign {
                        target: Expr::Ident(f.name.clone()),
                        value: Expr::Call {
                            callee: Box::new(lower_expr(dec)),
                            args: vec![Expr::Ident(f.name.clone())],
                        },
                    });
                }
            }
            Node::Class(c) => decls.push(Decl::Class(lower_class(c))),
            Node::Enum { name, members } => decls.push(Decl::Const(ConstDecl {
                name: name.clone(),
                value: Expr::Array(members.iter().map(|m| Expr::Lit(Lit::Str(m.clone()))).collect()),
            })),
            Node::Import { path } => imports.push(Import { path: path.clone(), alias: None }),
            Node::Use { module } => imports.push(Import { path: module.clone(), alias: None }),
            Node::ImportFrom { module, name, alias } => imports.push(Import {
                path: format!("{}.{}", module, name),
                alias: Some(alias.clone().unwrap_or_else(|| name.clone())),
            }),
            other => lower_stmt(other, &mut main),
        }
    }

    if !main.is_empty() {
        decls.push(Decl::Fn(FnDecl {
            name: ENTRY.to_string(),
            params: Vec::new(),
            is_async: false,
            body: Block { stmts: main },
        }));
    }

    imports.sort();
    imports.dedup();
    decls.sort_by(|a, b| a.name().cmp(b.name()));
    tracing::trace!(module = name, decls = decls.len(), "lowered");
    Module { name: name.to_string(), imports, decls }
}

fn lower_fn(f: &FunctionDef) -> FnDecl {
    FnDecl {
        name: f.name.clone(),
        params: f.params.clone(),
        is_async: f.is_async,
        body: lower_block(&f.body),
    }
}

fn lower_method(m: &MethodDef) -> FnDecl {
    FnDecl {
        name: m.name.clone(),
        params: m.params.clone(),
        is_async: m.is_async,
        body: lower_block(&m.body),
    }
}

fn lower_class(c: &ClassDef) -> ClassDecl {
    ClassDecl {
        name: c.name.clone(),
        bases: c.bases.clone(),
        methods: c.methods.iter().map(lower_method).collect(),
    }
}

fn lower_block(nodes: &[Node]) -> Block {
    let mut stmts = Vec::new();
    for n in nodes {
        lower_stmt(n, &mut stmts);
    }
    Block { stmts }
}

fn lower_stmt(node: &Node, out: &mut Vec<Stmt>) {
    let stmt = match node {
        Node::Assignment { target: Target::Name(name), value, inferred: true } => Stmt::Let {
            name: name.clone(),
            value: lower_expr(value),
        },
        Node::Assignment { target, value, .. } => Stmt::Assign {
            target: match target {
                Target::Name(n) => Expr::Ident(n.clone()),
                Target::Attribute { object, name } => Expr::Member {
                    object: Box::new(lower_expr(object)),
                    name: name.clone(),
                },
            },
            value: lower_expr(value),
        },
        Node::Conditional { cond, then_block, else_block } => Stmt::If {
            cond: lower_expr(cond),
            then_block: lower_block(then_block),
            else_block: (!else_block.is_empty()).then(|| lower_block(else_block)),
        },
        Node::Guard { cond, body, escape } => Stmt::If {
            cond: lower_expr(cond),
            then_block: lower_block(body),
            else_block: (!escape.is_empty()).then(|| lower_block(escape)),
        },
        Node::While { cond, body } => Stmt::While { cond: lower_expr(cond), body: lower_block(body) },
        Node::For { var, iterable, body, .. } => Stmt::For {
            var: var.clone(),
            iter: lower_expr(iterable),
            body: lower_block(body),
        },
        Node::Return(v) => Stmt::Return(v.as_deref().map(lower_expr)),
        Node::Yield(v) => Stmt::Yield(v.as_deref().map(lower_expr)),
        Node::Throw(e) => Stmt::Throw(lower_expr(e)),
        Node::TryCatch { body, catch_name, catch_block, finally_block } => Stmt::Try {
            body: lower_block(body),
            catch_name: catch_name.clone(),
            catch_block: lower_block(catch_block),
            finally_block: lower_block(finally_block),
        },
        Node::Print(args) => Stmt::Expr(Expr::call("imprimir", args.iter().map(lower_expr).collect())),
        Node::Assert { cond, message } => Stmt::If {
            cond: Expr::Unary { op: UnaryOp::Not, expr: Box::new(lower_expr(cond)) },
            then_block: Block {
                stmts: vec![Stmt::Throw(match message {
                    Some(m) => lower_expr(m),
                    None => Expr::Lit(Lit::Str("assertion failed".into())),
                })],
            },
            else_block: None,
        },
        Node::TypedList { name, elements, .. } => Stmt::Let {
            name: name.clone(),
            value: Expr::Array(elements.iter().map(lower_expr).collect()),
        },
        Node::TypedDict { name, entries, .. } => Stmt::Let {
            name: name.clone(),
            value: lower_entries(entries),
        },
        Node::Del(target) => Stmt::Expr(Expr::call("__del", vec![lower_expr(target)])),
        Node::Thread(inner) if inner.is_expression() => Stmt::Expr(Expr::call("__spawn", vec![thunk(inner)])),
        Node::Defer(inner) if inner.is_expression() => Stmt::Expr(Expr::call("__defer", vec![thunk(inner)])),
        Node::Break => Stmt::Break,
        Node::Continue => Stmt::Continue,
        Node::Pass => return,
        other if other.is_expression() => Stmt::Expr(lower_expr(other)),
        other => Stmt::Opaque(other.kind_name()),
    };
    out.push(stmt);
}

fn thunk(body: &Node) -> Expr {
    Expr::Lambda { params: Vec::new(), body: Box::new(lower_expr(body)) }
}

fn lower_entries(entries: &[(Node, Node)]) -> Expr {
    Expr::Object(entries.iter().map(|(k, v)| (lower_expr(k), lower_expr(v))).collect())
}

fn lower_lit(lit: &Literal) -> Lit {
    match lit {
        Literal::Int(i) => Lit::Int(*i),
        Literal::Float(x) => Lit::Float(*x),
        Literal::Str(s) => Lit::Str(s.clone()),
        Literal::Bool(b) => Lit::Bool(*b),
        Literal::Null => Lit::Null,
    }
}

fn lower_expr(node: &Node) -> Expr {
    match node {
        Node::Value(lit) => Expr::Lit(lower_lit(lit)),
        Node::Identifier(n) => Expr::Ident(n.clone()),
        Node::Binary { left, op, right } => Expr::Binary {
            left: Box::new(lower_expr(left)),
            op: *op,
            right: Box::new(lower_expr(right)),
        },
        Node::Unary { op, operand } => Expr::Unary { op: *op, expr: Box::new(lower_expr(operand)) },
        Node::Call { callee, args } => Expr::call(callee, args.iter().map(lower_expr).collect()),
        Node::Instance { class_name, args } => Expr::call(class_name, args.iter().map(lower_expr).collect()),
        Node::MethodCall { object, method, args } => Expr::Call {
            callee: Box::new(Expr::Member { object: Box::new(lower_expr(object)), name: method.clone() }),
            args: args.iter().map(lower_expr).collect(),
        },
        Node::Attribute { object, name } => Expr::Member { object: Box::new(lower_expr(object)), name: name.clone() },
        Node::Lambda { params, body } => Expr::Lambda { params: params.clone(), body: Box::new(lower_expr(body)) },
        Node::Await(e) => Expr::call("__await", vec![lower_expr(e)]),
        Node::Option(None) => Expr::Lit(Lit::Null),
        Node::Option(Some(e)) => lower_expr(e),
        Node::List(items) => Expr::Array(items.iter().map(lower_expr).collect()),
        Node::Dict(entries) => lower_entries(entries),
        Node::Holobit { values, .. } => {
            Expr::call("holobit", vec![Expr::Array(values.iter().map(lower_expr).collect())])
        }
        other => Expr::Opaque(other.kind_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_source;

    fn lowered(src: &str) -> Module {
        lower(&parse_source(src).unwrap().program)
    }

    #[test]
    fn declarations_sorted_and_main_synthesized() {
        let m = lowered("func zeta():\n  retorno 1\nfin\nvar x = 2\nclase Alfa:\n  metodo m(self):\n    pasar\n  fin\nfin");
        let names: Vec<&str> = m.decls.iter().map(Decl::name).collect();
        assert_eq!(names, vec!["Alfa", "main", "zeta"]);
        match m.decl("main") {
            Some(Decl::Fn(f)) => assert_eq!(f.body.stmts.len(), 1),
            other => panic!("unexpected decl {:?}", other),
        }
    }

    #[test]
    fn imports_are_collected_and_sorted() {
        let m = lowered("usar \"zlib\"\ndesde \"util\" import doble como d\nimport \"alfa\"");
        let paths: Vec<&str> = m.imports.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["alfa", "util.doble", "zlib"]);
        assert_eq!(m.imports[1].alias.as_deref(), Some("d"));
        assert!(m.decl(ENTRY).is_none());
    }

    #[test]
    fn decorators_become_rebinding_calls() {
        let m = lowered("@traza\nfunc f():\n  retorno 1\nfin");
        match m.decl(ENTRY) {
            Some(Decl::Fn(main)) => assert_eq!(main.body.stmts, vec![Stmt::Assign {
                target: Expr::Ident("f".into()),
                value: Expr::call("traza", vec![Expr::Ident("f".into())]),
            }]),
            other => panic!("unexpected decl {:?}", other),
        }
    }

    #[test]
    fn unsupported_constructs_are_opaque() {
        let m = lowered("con abrir() como h:\n  imprimir(h)\nfin");
        match m.decl(ENTRY) {
            Some(Decl::Fn(main)) => assert_eq!(main.body.stmts, vec![Stmt::Opaque("with")]),
            other => panic!("unexpected decl {:?}", other),
        }
    }
}
