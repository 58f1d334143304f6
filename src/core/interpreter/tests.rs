use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::*;
use crate::core::limits::NoopLimiter;
use crate::core::memory::FreeListPolicy;
use crate::core::parser::parse_source;
use crate::core::resolver::ResolveError;
use crate::core::security::{DenyRule, RuleKind, RuleValidator};
use crate::core::semantic_analyzer::SemanticError;

/// Modules kept in memory, keyed by import path.
struct MapResolver(HashMap<String, String>);

impl ModuleResolver for MapResolver {
    fn resolve(&self, path: &str) -> Result<PathBuf, ResolveError> {
        if self.0.contains_key(path) {
            Ok(PathBuf::from(path))
        } else {
            Err(ResolveError::NotFound { path: path.to_string() })
        }
    }

    fn load(&self, path: &str) -> Result<Vec<Node>, ResolveError> {
        let src = self.0.get(path).ok_or_else(|| ResolveError::NotFound { path: path.to_string() })?;
        parse_source(src)
            .map(|out| out.program)
            .map_err(|e| ResolveError::Syntax { path: path.to_string(), message: e.to_string() })
    }
}

fn interpreter(buf: &SharedBuffer) -> Interpreter {
    Interpreter::builder().output(buf.clone()).limiter(Arc::new(NoopLimiter)).build()
}

fn run_with(src: &str, options: &ExecuteOptions) -> (Result<Option<Value>, CobraError>, String) {
    let buf = SharedBuffer::new();
    let mut interp = interpreter(&buf);
    let program = parse_source(src).unwrap().program;
    let result = interp.execute(program, options);
    interp.join_threads();
    (result, buf.contents())
}

fn run(src: &str) -> (Result<Option<Value>, CobraError>, String) {
    run_with(src, &ExecuteOptions::default())
}

fn output(src: &str) -> String {
    let (result, out) = run(src);
    if let Err(e) = result {
        panic!("program failed: {}\n--- output ---\n{}", e, out);
    }
    out
}

#[test]
fn print_writes_one_line_per_argument() {
    assert_eq!(output("var x = 2\nimprimir(x, x * 3, \"hola\")"), "2\n6\nhola\n");
}

#[test]
fn first_non_null_top_level_value_is_returned() {
    let (result, out) = run("var x = 2\nx * 21\nimprimir(\"no llega\")");
    assert!(matches!(result.unwrap(), Some(Value::Int(42))));
    assert_eq!(out, "");
}

#[test]
fn functions_and_recursion() {
    let src = "func fact(n):\n  si n <= 1:\n    retorno 1\n  fin\n  retorno n * fact(n - 1)\nfin\nimprimir(fact(10))";
    assert_eq!(output(src), "3628800\n");
}

#[test]
fn runaway_recursion_is_stopped() {
    let (result, _) = run("func f(n):\n  retorno f(n + 1)\nfin\nf(0)");
    assert!(matches!(result, Err(CobraError::Runtime(RuntimeError::RecursionLimit(MAX_CALL_DEPTH)))));
}

#[test]
fn classes_with_special_methods() {
    let src = "clase Punto:\n  metodo inicializar(self, x):\n    self.x = x\n  fin\n  metodo texto(self):\n    retorno \"P(\" + texto(self.x) + \")\"\n  fin\n  metodo mover(self, d):\n    self.x = self.x + d\n  fin\nfin\np = Punto(3)\np.mover(4)\nimprimir(p, p.x)";
    assert_eq!(output(src), "P(7)\n7\n");
}

#[test]
fn inherited_methods_are_found() {
    let src = "clase Animal:\n  metodo hablar(self):\n    retorno \"...\"\n  fin\nfin\nclase Perro(Animal):\nfin\nd = Perro()\nimprimir(d.hablar())";
    assert_eq!(output(src), "...\n");
}

#[test]
fn generators_resume_across_loops() {
    let src = "func cuenta(n):\n  var i = 0\n  mientras i < n:\n    yield i\n    i = i + 1\n  fin\nfin\npara v in cuenta(3):\n  imprimir(v)\nfin";
    assert_eq!(output(src), "0\n1\n2\n");
}

#[test]
fn next_returns_null_once_exhausted() {
    let src = "func dos():\n  yield 1\n  yield 2\nfin\ng = dos()\nimprimir(siguiente(g), siguiente(g), siguiente(g))";
    assert_eq!(output(src), "1\n2\nnulo\n");
}

#[test]
fn generator_for_loop_with_break() {
    let src = "func pares():\n  para x in rango(10):\n    si x % 2 == 0:\n      yield x\n    fin\n    si x > 5:\n      romper\n    fin\n  fin\n  yield 99\nfin\npara p in pares():\n  imprimir(p)\nfin";
    assert_eq!(output(src), "0\n2\n4\n6\n99\n");
}

#[test]
fn try_catch_finally() {
    let src = "intentar:\n  lanzar \"boom\"\ncapturar e:\n  imprimir(e)\nfinalmente:\n  imprimir(\"final\")\nfin";
    assert_eq!(output(src), "boom\nfinal\n");
    let src = "intentar:\n  var x = 1 / 0\ncapturar e:\n  imprimir(e)\nfin";
    assert_eq!(output(src), "division by zero\n");
}

#[test]
fn uncaught_exception_carries_its_value() {
    let (result, _) = run("lanzar 5");
    match result {
        Err(CobraError::Runtime(RuntimeError::Exception(Value::Int(5)))) => {}
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn global_declaration_writes_outer_binding() {
    let src = "var total = 0\nfunc suma(n):\n  global total\n  total = total + n\nfin\nsuma(5)\nsuma(2)\nimprimir(total)";
    assert_eq!(output(src), "7\n");
}

#[test]
fn defer_runs_after_the_body() {
    let src = "func f():\n  defer imprimir(\"tarde\")\n  defer imprimir(\"antes\")\n  imprimir(\"pronto\")\nfin\nf()";
    assert_eq!(output(src), "pronto\nantes\ntarde\n");
}

#[test]
fn switch_binds_and_guards() {
    let src = "p = [0, 7]\nswitch p:\n  case (0, y) si y > 10:\n    imprimir(\"grande\")\n  case (0, y):\n    imprimir(y)\n  case _:\n    imprimir(\"otro\")\nfin";
    assert_eq!(output(src), "7\n");
}

#[test]
fn typed_list_checks_elements() {
    let (result, _) = run("lista<int> xs = [1, \"dos\"]");
    assert!(matches!(result, Err(CobraError::Runtime(RuntimeError::Type(_)))));
}

#[test]
fn threads_are_joined() {
    let src = "func trabajo(n):\n  imprimir(n * 2)\nfin\nhilo trabajo(21)";
    assert_eq!(output(src), "42\n");
}

#[test]
fn function_slots_are_released() {
    let buf = SharedBuffer::new();
    let mut interp = Interpreter::builder()
        .output(buf.clone())
        .limiter(Arc::new(NoopLimiter))
        .memory_policy(Box::new(FreeListPolicy::new(64)))
        .build();
    let program = parse_source("func f():\n  var a = 1\n  var b = 2\n  imprimir(a + b)\nfin\nf()\nf()").unwrap().program;
    interp.execute(program, &ExecuteOptions::default()).unwrap();
    assert_eq!(buf.contents(), "3\n3\n");
    // only `f` is still bound
    assert_eq!(interp.memory().lock().live_slots(), 1);
}

#[test]
fn safe_mode_rejects_denied_modules() {
    let (result, _) = run("usar \"os\"");
    assert!(matches!(result, Err(CobraError::Security(_))));
    let unsafe_run = ExecuteOptions { safe_mode: false, ..ExecuteOptions::default() };
    let (result, _) = run_with("usar \"os\"", &unsafe_run);
    assert!(matches!(result, Err(CobraError::Runtime(RuntimeError::Import(_)))));
}

#[test]
fn extra_validators_apply_per_run() {
    let rules = RuleValidator::new(vec![DenyRule { kind: RuleKind::Call, name: "borrar".into(), message: None }]);
    let options = ExecuteOptions { extra_validators: vec![Arc::new(rules)], ..ExecuteOptions::default() };
    let src = "func borrar():\n  imprimir(\"x\")\nfin\nborrar()";
    let (result, out) = run_with(src, &options);
    match result {
        Err(CobraError::Security(e)) => assert_eq!(e.validator, "rules"),
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(out, "");
}

#[test]
fn node_limit_is_enforced_before_running() {
    let options = ExecuteOptions { node_limit: 3, ..ExecuteOptions::default() };
    let (result, out) = run_with("imprimir(1 + 2 + 3 + 4)", &options);
    assert!(matches!(result, Err(CobraError::Resource(ResourceError::NodeLimit { limit: 3, .. }))));
    assert_eq!(out, "");
}

#[test]
fn imports_run_in_the_current_context() {
    let modules = HashMap::from([("util".to_string(), "func doble(x):\n  retorno x * 2\nfin".to_string())]);
    let buf = SharedBuffer::new();
    let mut interp = Interpreter::builder()
        .output(buf.clone())
        .limiter(Arc::new(NoopLimiter))
        .resolver(Arc::new(MapResolver(modules)))
        .build();
    let program = parse_source("desde \"util\" import doble como d\nimprimir(d(4), d(1))").unwrap().program;
    interp.execute(program, &ExecuteOptions::default()).unwrap();
    assert_eq!(buf.contents(), "8\n2\n");
    assert!(matches!(interp.global("doble"), Some(Value::Function(_))));
}

#[test]
fn circular_aliases_are_reported() {
    let mut interp = Interpreter::builder().limiter(Arc::new(NoopLimiter)).build();
    interp.bind("a", Binding::Alias("b".into())).unwrap();
    interp.bind("b", Binding::Alias("a".into())).unwrap();
    match interp.lookup("a") {
        Err(CobraError::Resource(ResourceError::CircularReference { .. })) => {}
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn validation_state_is_reset_between_runs() {
    let buf = SharedBuffer::new();
    let mut interp = interpreter(&buf);
    let first = parse_source("imprimir(1)").unwrap().program;
    interp.execute(first, &ExecuteOptions::default()).unwrap();
    let second = parse_source("usar \"os\"").unwrap().program;
    assert!(matches!(interp.execute(second, &ExecuteOptions::default()), Err(CobraError::Security(_))));
}

#[test]
fn generators_suspend_inside_try() {
    let src = "func g():\n  intentar:\n    yield 1\n    lanzar \"x\"\n  capturar e:\n    yield e\n  finalmente:\n    imprimir(\"cierre\")\n  fin\n  yield 3\nfin\npara v in g():\n  imprimir(v)\nfin";
    assert_eq!(output(src), "1\nx\ncierre\n3\n");
}

#[test]
fn generator_errors_pass_through_finally() {
    let src = "func h():\n  intentar:\n    yield 1\n    lanzar \"fallo\"\n  finalmente:\n    imprimir(\"limpio\")\n  fin\n  yield 2\nfin\npara v in h():\n  imprimir(v)\nfin";
    let (result, out) = run(src);
    assert_eq!(out, "1\nlimpio\n");
    match result {
        Err(CobraError::Runtime(RuntimeError::Exception(Value::Str(s)))) => assert_eq!(s, "fallo"),
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn generator_break_runs_finally_inside_the_loop() {
    let src = "func g():\n  para i in rango(5):\n    intentar:\n      yield i\n      si i == 1:\n        romper\n      fin\n    finalmente:\n      imprimir(\"f\")\n    fin\n  fin\n  yield 10\nfin\npara v in g():\n  imprimir(v)\nfin";
    assert_eq!(output(src), "0\nf\n1\nf\n10\n");
}

#[test]
fn generators_suspend_inside_with() {
    let src = "clase Recurso:\n  metodo __enter__(self):\n    imprimir(\"abre\")\n    retorno 5\n  fin\n  metodo __exit__(self, err):\n    imprimir(\"cierra\", err)\n  fin\nfin\nfunc lee():\n  con Recurso() como r:\n    yield r\n    yield r + 1\n  fin\n  yield 0\nfin\npara v in lee():\n  imprimir(v)\nfin";
    assert_eq!(output(src), "abre\n5\n6\ncierra\nnulo\n0\n");
}

#[test]
fn generator_with_exit_sees_the_error() {
    let src = "clase Recurso:\n  metodo __exit__(self, err):\n    imprimir(err)\n  fin\nfin\nfunc lee():\n  con Recurso():\n    yield 1\n    lanzar \"roto\"\n  fin\nfin\npara v in lee():\n  imprimir(v)\nfin";
    let (result, out) = run(src);
    assert!(matches!(result, Err(CobraError::Runtime(RuntimeError::Exception(_)))));
    assert!(out.starts_with("1\n"), "output was {:?}", out);
    assert!(out.contains("roto"), "output was {:?}", out);
}

#[test]
fn generator_defers_run_when_the_generator_finishes() {
    let src = "func g():\n  defer imprimir(\"fin de g\")\n  yield 1\n  yield 2\nfin\nfunc usa():\n  para v in g():\n    imprimir(v)\n  fin\n  imprimir(\"despues\")\nfin\nusa()";
    assert_eq!(output(src), "1\n2\nfin de g\ndespues\n");
}

#[test]
fn recursion_close_to_the_limit_completes() {
    let src = "func f(n):\n  si n == 0:\n    retorno 0\n  fin\n  retorno 1 + f(n - 1)\nfin\nimprimir(f(60))";
    assert_eq!(output(src), "60\n");
}

#[test]
fn repeated_lambdas_reuse_their_runtime_objects() {
    let buf = SharedBuffer::new();
    let mut interp = interpreter(&buf);
    let src = "var total = 0\nvar i = 0\nmientras i < 5000:\n  f = lambda x: x + i\n  total = total + f(1)\n  i = i + 1\nfin\nimprimir(total)";
    let program = parse_source(src).unwrap().program;
    interp.execute(program, &ExecuteOptions::default()).unwrap();
    assert_eq!(buf.contents(), "12502500\n");
    assert!(interp.interned_len() <= 2, "interned {}", interp.interned_len());
    assert!(interp.run.validated.len() < 100, "validated {}", interp.run.validated.len());
}

#[test]
fn bindings_past_the_arena_still_run() {
    let buf = SharedBuffer::new();
    let mut interp = interpreter(&buf);
    let mut src: String = (0..1100).map(|i| format!("var v{i} = {i}\n")).collect();
    src.push_str("imprimir(v0 + v1099)");
    let program = parse_source(&src).unwrap().program;
    interp.execute(program, &ExecuteOptions::default()).unwrap();
    assert_eq!(buf.contents(), "1099\n");
    assert!(interp.memory().lock().failed() >= 1100 - 1024);
}

#[test]
fn huge_ranges_are_iterated_lazily() {
    let src = "para i in rango(3000000000):\n  si i == 3:\n    romper\n  fin\n  imprimir(i)\nfin\nimprimir(longitud(rango(3000000000)))";
    assert_eq!(output(src), "0\n1\n2\n3000000000\n");
}

fn run_both(src: &str) -> [(String, String); 2] {
    [true, false].map(|optimize| {
        let options = ExecuteOptions { optimize, ..ExecuteOptions::default() };
        let (result, out) = run_with(src, &options);
        (format!("{:?}", result), out)
    })
}

#[test]
fn optimizing_keeps_output_and_error_order() {
    let programs = [
        "var a = 1\nvar b = 0\nimprimir(\"hola\", a / b, a / b)",
        "func f():\n  imprimir(\"f\")\n  retorno 1\nfin\nvar a = 4\nvar b = 2\nimprimir(f(), a / b, a / b)",
        "clase P:\n  metodo __eq__(self, o):\n    imprimir(\"eq\")\n    retorno verdadero\n  fin\nfin\np = P()\nq = P()\nimprimir(p == q, p == q)",
        "func doble(x):\n  retorno x * 2\nfin\nimprimir(doble(2), doble(2) + 1)",
        "var x = 2 * 3\nsi falso:\n  imprimir(\"nunca\")\nfin\nimprimir(x + 1, x + 1)",
    ];
    for src in programs {
        let [optimized, plain] = run_both(src);
        assert_eq!(optimized, plain, "program:\n{}", src);
    }
    let (result, out) = run("var a = 1\nvar b = 0\nimprimir(\"hola\", a / b, a / b)");
    assert_eq!(out, "hola\n");
    assert!(matches!(result, Err(CobraError::Runtime(RuntimeError::DivisionByZero))));
}

#[test]
fn calls_before_the_definition_fail_either_way() {
    let src = "imprimir(doble(2))\nfunc doble(x):\n  retorno x * 2\nfin";
    for [optimize] in [[true], [false]] {
        let options = ExecuteOptions { optimize, ..ExecuteOptions::default() };
        let (result, out) = run_with(src, &options);
        assert_eq!(out, "");
        assert!(
            matches!(&result, Err(CobraError::Semantic(SemanticError::NameError { name })) if name == "doble"),
            "optimize={} gave {:?}",
            optimize,
            result
        );
    }
}

#[test]
fn guards_on_literals_are_still_checked() {
    let src = "func f():\n  garantia verdadero:\n    imprimir(1)\n  sino:\n    imprimir(2)\n  fin\nfin\nf()";
    let (result, out) = run(src);
    assert_eq!(out, "");
    assert!(matches!(result, Err(CobraError::Semantic(SemanticError::UnprovenGuard))));
}
