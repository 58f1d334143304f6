//! tests/language_properties.rs
//! End-to-end properties of the front end and the interpreter.

use std::sync::Arc;

use cobra_core::core::ast::{Literal, Node, Target};
use cobra_core::core::interpreter::{value::Value, ExecuteOptions, Interpreter, SharedBuffer};
use cobra_core::core::lexer::tokenize;
use cobra_core::core::limits::{NoopLimiter, ResourceError};
use cobra_core::core::optimizer::optimize;
use cobra_core::core::parser::{parse_source, AdvisoryKind};
use cobra_core::core::semantic_analyzer::{SemanticAnalyzer, SemanticError};
use cobra_core::core::token::TokenKind;
use cobra_core::CobraError;

fn run(src: &str, options: &ExecuteOptions) -> (Result<Option<Value>, CobraError>, String) {
    let buf = SharedBuffer::new();
    let mut interp = Interpreter::builder().output(buf.clone()).limiter(Arc::new(NoopLimiter)).build();
    let program = parse_source(src).map(|out| out.program);
    let result = program.and_then(|p| interp.execute(p, options));
    interp.join_threads();
    (result, buf.contents())
}

fn analyze(src: &str) -> Result<(), SemanticError> {
    SemanticAnalyzer::new().analyze(&parse_source(src).unwrap().program)
}

#[test]
fn token_stream_ends_with_single_eof() {
    for src in ["", "var x = 1", "imprimir(\"hola\")\n\n", "# solo un comentario\n"] {
        let tokens = tokenize(src).unwrap();
        let eofs = tokens.iter().filter(|t| t.kind == TokenKind::Eof).count();
        assert_eq!(eofs, 1, "{:?}", src);
        assert_eq!(tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
    }
}

#[test]
fn one_top_level_node_per_statement() {
    let out = parse_source("var a = 1\nvar b = 2\nfunc f():\n  retorno a\nfin\nimprimir(f())").unwrap();
    assert_eq!(out.program.len(), 4);
}

#[test]
fn var_declaration_shape() {
    let out = parse_source("var x = 5").unwrap();
    assert_eq!(out.program, vec![Node::Assignment {
        target: Target::Name("x".into()),
        value: Box::new(Node::Value(Literal::Int(5))),
        inferred: false,
    }]);
}

#[test]
fn var_then_print() {
    let (result, output) = run("var x = 3\nimprimir(x)", &ExecuteOptions::default());
    assert!(result.unwrap().is_none());
    assert_eq!(output, "3\n");
}

#[test]
fn duplicate_declaration_vs_shadowing() {
    assert_eq!(
        analyze("func f():\n  pasar\nfin\nfunc f():\n  pasar\nfin").unwrap_err(),
        SemanticError::DuplicateDeclaration { name: "f".into() }
    );
    assert!(analyze("func f():\n  pasar\nfin\nfunc g():\n  func f():\n    pasar\n  fin\nfin").is_ok());
}

#[test]
fn guard_is_advisory_to_parser_and_error_to_analyzer() {
    let src = "func f(x):\n  garantia x:\n    pasar\n  sino:\n    imprimir(x)\n  fin\nfin";
    let out = parse_source(src).unwrap();
    assert!(out.advisories.iter().any(|a| a.kind == AdvisoryKind::UnprovenGuardTermination));
    assert_eq!(analyze(src).unwrap_err(), SemanticError::UnprovenGuard);
}

#[test]
fn inheritance_cycle_is_rejected() {
    assert!(matches!(analyze("clase A(A):\nfin"), Err(SemanticError::InheritanceCycle { .. })));
}

#[test]
fn special_method_aliases_normalize() {
    let out = parse_source("clase P:\n  metodo inicializar(self):\n    pasar\n  fin\nfin").unwrap();
    match &out.program[0] {
        Node::Class(c) => {
            assert_eq!(c.methods[0].name, "__init__");
            assert_eq!(c.methods[0].original_name.as_deref(), Some("inicializar"));
        }
        other => panic!("unexpected node {:?}", other),
    }
}

#[test]
fn optimizer_is_idempotent() {
    let src = "func cuadrado(n):\n  retorno n * n\nfin\nvar a = 4\nvar b = cuadrado(a) + (a + 1) * (a + 1)\nsi 1 < 2:\n  imprimir(b)\nfin\nmientras falso:\n  imprimir(0)\nfin\nimprimir(2 * 3 + a)";
    let once = optimize(parse_source(src).unwrap().program);
    assert_eq!(optimize(once.clone()), once);
}

#[test]
fn optimized_program_prints_the_same() {
    let src = "var a = 4\nvar b = (a + 1) * (a + 1)\nsi 1 < 2:\n  imprimir(b, 7 / 2)\nfin";
    let (result, output) = run(src, &ExecuteOptions::default());
    assert!(result.is_ok());
    assert_eq!(output, "25\n3.5\n");
}

#[test]
fn node_limit_fails_without_output() {
    let options = ExecuteOptions { node_limit: 5, ..ExecuteOptions::default() };
    let (result, output) = run("imprimir(1)\nimprimir(2)\nimprimir(3)\nimprimir(4)", &options);
    assert!(matches!(result, Err(CobraError::Resource(ResourceError::NodeLimit { limit: 5, .. }))));
    assert!(output.is_empty());
}

#[test]
fn uncaught_exception_surfaces_as_runtime_error() {
    let (result, output) = run("imprimir(\"antes\")\nlanzar \"fallo\"", &ExecuteOptions::default());
    assert_eq!(output, "antes\n");
    let err = result.unwrap_err();
    assert_eq!(err.kind(), "runtime error");
}

#[test]
fn lowered_ir_is_kept_after_execute() {
    let buf = SharedBuffer::new();
    let mut interp = Interpreter::builder().output(buf.clone()).limiter(Arc::new(NoopLimiter)).build();
    let program = parse_source("func doble(x):\n  retorno x * 2\nfin\nimprimir(doble(4))").unwrap().program;
    interp.execute(program, &ExecuteOptions::default()).unwrap();
    assert_eq!(buf.contents(), "8\n");
    let ir = interp.last_ir().unwrap();
    // `doble` was inlined and dropped before lowering
    assert!(ir.decl("doble").is_none());
    assert!(ir.decl("main").is_some());
}
