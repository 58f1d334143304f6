use super::*;
use crate::core::ast::{BinaryOp, Literal, Pattern, Target};
use crate::core::lexer::tokenize;

fn parse_ok(src: &str) -> ParseOutput {
    parse(tokenize(src).unwrap()).unwrap()
}

fn parse_err(src: &str) -> ParseError {
    parse(tokenize(src).unwrap()).unwrap_err()
}

fn kinds_of(out: &ParseOutput) -> Vec<AdvisoryKind> {
    out.advisories.iter().map(|a| a.kind).collect()
}

#[test]
fn var_declaration_shape() {
    let out = parse_ok("var x = 5");
    assert_eq!(
        out.program,
        vec![Node::Assignment {
            target: Target::Name("x".into()),
            value: Box::new(Node::int(5)),
            inferred: false,
        }]
    );
}

#[test]
fn inferred_declaration() {
    let out = parse_ok("variable y := 1 + 2");
    match &out.program[0] {
        Node::Assignment { inferred, value, .. } => {
            assert!(*inferred);
            assert_eq!(**value, Node::binary(Node::int(1), BinaryOp::Add, Node::int(2)));
        }
        other => panic!("unexpected node {:?}", other),
    }
}

#[test]
fn precedence_follows_the_ladder() {
    let out = parse_ok("x = 1 + 2 * 3 == 7 y no falso");
    let expected = Node::binary(
        Node::binary(
            Node::binary(Node::int(1), BinaryOp::Add, Node::binary(Node::int(2), BinaryOp::Mul, Node::int(3))),
            BinaryOp::Eq,
            Node::int(7),
        ),
        BinaryOp::And,
        Node::unary(crate::core::ast::UnaryOp::Not, Node::boolean(false)),
    );
    assert_eq!(out.program, vec![Node::assign("x", expected)]);
}

#[test]
fn else_if_chain_nests_in_else_block() {
    let src = "si a:\n  imprimir(1)\nsino si b:\n  imprimir(2)\nsino:\n  imprimir(3)\nfin";
    let out = parse_ok(src);
    assert_eq!(out.program.len(), 1);
    match &out.program[0] {
        Node::Conditional { else_block, .. } => match &else_block[0] {
            Node::Conditional { else_block: inner, .. } => assert_eq!(inner.len(), 1),
            other => panic!("expected nested conditional, got {:?}", other),
        },
        other => panic!("unexpected node {:?}", other),
    }
}

#[test]
fn statement_count_matches_top_level_nodes() {
    let out = parse_ok("var a = 1\nvar b = 2\nimprimir(a, b)\nfunc f(x):\n  retorno x\nfin");
    assert_eq!(out.program.len(), 4);
}

#[test]
fn guard_requires_else_branch() {
    let err = parse_err("garantia x > 0:\n  imprimir(x)\nfin");
    assert!(err.to_string().contains("requires a 'sino'"), "{}", err);
}

#[test]
fn guard_requires_colon() {
    let err = parse_err("garantia x > 0\n  imprimir(x)\nsino:\n  retorno\nfin");
    assert!(err.to_string().contains("Expected ':'"), "{}", err);
}

#[test]
fn guard_without_terminating_escape_is_advisory() {
    let out = parse_ok("garantia x:\n  imprimir(x)\nsino:\n  imprimir(0)\nfin");
    assert_eq!(kinds_of(&out), vec![AdvisoryKind::UnprovenGuardTermination]);
    let clean = parse_ok("func f(x):\n  garantia x:\n    pasar\n  sino:\n    retorno 0\n  fin\nfin");
    assert!(clean.advisories.is_empty());
}

#[test]
fn alias_mixing_reported_once() {
    let out = parse_ok("clase A:\nfin\nestructura B:\nfin\nregistro C:\nfin");
    assert_eq!(kinds_of(&out), vec![AdvisoryKind::AliasMixing]);
}

#[test]
fn special_method_collision() {
    let src = "clase P:\n  metodo inicializar(self):\n    pasar\n  fin\n  metodo __init__(self):\n    pasar\n  fin\nfin";
    let out = parse_ok(src);
    assert_eq!(kinds_of(&out), vec![AdvisoryKind::SpecialMethodCollision]);
    match &out.program[0] {
        Node::Class(c) => {
            assert_eq!(c.methods[0].name, "__init__");
            assert_eq!(c.methods[0].original_name.as_deref(), Some("inicializar"));
        }
        other => panic!("unexpected node {:?}", other),
    }
}

#[test]
fn defer_outside_function_is_advisory() {
    let out = parse_ok("defer imprimir(1)");
    assert_eq!(kinds_of(&out), vec![AdvisoryKind::DeferOutsideFunction]);
    let inside = parse_ok("func f():\n  defer imprimir(1)\nfin");
    assert!(inside.advisories.is_empty());
}

#[test]
fn keyword_suggestion_for_typo() {
    let out = parse_ok("imprimr \"hola\"");
    let advisory = &out.advisories[0];
    assert_eq!(advisory.kind, AdvisoryKind::KeywordSuggestion);
    assert!(advisory.message.contains("imprimir"));
}

#[test]
fn reserved_and_duplicate_parameters() {
    let err = parse_err("func f(si):\nfin");
    assert!(err.to_string().contains("'si' is a reserved word"), "{}", err);
    let err = parse_err("func f(a, a):\nfin");
    assert!(err.to_string().contains("Duplicate parameter 'a'"), "{}", err);
}

#[test]
fn block_errors_are_collected() {
    let err = parse_err("si a:\n  var = 1\nfin\nmientras b:\n  var = 2\nfin");
    assert_eq!(err.errors.len(), 2);
    assert!(err.errors[0].message.starts_with("Error in 'si' body"));
    assert!(err.to_string().contains('\n'));
}

#[test]
fn comprehensions_and_collections() {
    let out = parse_ok("v = [x * 2 para x in rango(5) si x > 1]\nd = {k: 1 para k in v}\nl = [1, 2]");
    assert!(matches!(&out.program[0], Node::Assignment { value, .. } if matches!(**value, Node::ListComprehension { .. })));
    assert!(matches!(&out.program[1], Node::Assignment { value, .. } if matches!(**value, Node::DictComprehension { .. })));
    assert!(matches!(&out.program[2], Node::Assignment { value, .. } if **value == Node::List(vec![Node::int(1), Node::int(2)])));
}

#[test]
fn switch_patterns_and_guards() {
    let src = "switch p:\n  case (0, y):\n    imprimir(y)\n  case n si n > 3:\n    imprimir(n)\n  case _:\n    pasar\n  sino:\n    pasar\nfin";
    let out = parse_ok(src);
    match &out.program[0] {
        Node::Switch { cases, default, .. } => {
            assert_eq!(cases.len(), 3);
            assert_eq!(
                cases[0].pattern,
                Pattern::Tuple(vec![Pattern::Literal(Literal::Int(0)), Pattern::Binding("y".into())])
            );
            assert!(cases[1].guard.is_some());
            assert_eq!(cases[2].pattern, Pattern::Wildcard);
            assert_eq!(default.len(), 1);
        }
        other => panic!("unexpected node {:?}", other),
    }
}

#[test]
fn known_class_call_becomes_instance() {
    let out = parse_ok("clase Punto:\nfin\np = Punto(1, 2)\nq = otro(1)");
    assert!(matches!(&out.program[1], Node::Assignment { value, .. } if matches!(**value, Node::Instance { .. })));
    assert!(matches!(&out.program[2], Node::Assignment { value, .. } if matches!(**value, Node::Call { .. })));
}

#[test]
fn attribute_forms() {
    let out = parse_ok("atributo p x = 3\np.y = atributo p x\nimprimir(p.sumar(1))");
    match &out.program[0] {
        Node::Assignment { target: Target::Attribute { name, .. }, .. } => assert_eq!(name, "x"),
        other => panic!("unexpected node {:?}", other),
    }
    assert!(matches!(&out.program[1], Node::Assignment { target: Target::Attribute { .. }, value, .. }
        if matches!(**value, Node::Attribute { .. })));
}

#[test]
fn typed_collections_and_options() {
    let out = parse_ok("lista<int> xs = [1, 2]\ndiccionario<str, int> d = {\"a\": 1}\noption o = 3\noption n = None");
    assert!(matches!(&out.program[0], Node::TypedList { elements, .. } if elements.len() == 2));
    assert!(matches!(&out.program[1], Node::TypedDict { entries, .. } if entries.len() == 1));
    assert!(matches!(&out.program[2], Node::Assignment { value, .. } if matches!(**value, Node::Option(Some(_)))));
    assert!(matches!(&out.program[3], Node::Assignment { value, .. } if **value == Node::Option(None)));
}

#[test]
fn decorated_async_function() {
    let out = parse_ok("@traza\n@cache(10)\nasincronico func f<T>(a):\n  retorno esperar a\nfin");
    match &out.program[0] {
        Node::Function(f) => {
            assert_eq!(f.decorators.len(), 2);
            assert!(f.is_async);
            assert_eq!(f.type_params, vec!["T".to_string()]);
        }
        other => panic!("unexpected node {:?}", other),
    }
}

#[test]
fn try_catch_finally_and_imports() {
    let src = "desde \"util\" import suma como s\nintentar:\n  lanzar 1\ncapturar e:\n  imprimir(e)\nfinalmente:\n  pasar\nfin";
    let out = parse_ok(src);
    assert!(matches!(&out.program[0], Node::ImportFrom { alias: Some(a), .. } if a == "s"));
    match &out.program[1] {
        Node::TryCatch { catch_name, finally_block, .. } => {
            assert_eq!(catch_name.as_deref(), Some("e"));
            assert_eq!(finally_block.len(), 1);
        }
        other => panic!("unexpected node {:?}", other),
    }
}

#[test]
fn top_level_error_stops_the_pass() {
    let err = parse_err("var = 1\nvar = 2");
    assert_eq!(err.errors.len(), 1);
}
