//! tests/exec_smoke.rs
//! `cobra run` end to end, with and without the optimizer.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn cobra_run(input: &Path, config: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cobra"))
        .args(["run", input.to_str().unwrap(), "--config", config.to_str().unwrap()])
        .env_remove("COBRA_LOG")
        .output()
        .expect("spawn cobra run")
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Runs `src` once optimized and once as written; returns both outputs.
fn run_both(src: &str) -> (Output, Output) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("prog.co");
    fs::write(&input, src).unwrap();
    let optimized = dir.path().join("opt.toml");
    fs::write(&optimized, "[execute]\noptimize = true\n").unwrap();
    let plain = dir.path().join("plain.toml");
    fs::write(&plain, "[execute]\noptimize = false\n").unwrap();
    (cobra_run(&input, &optimized), cobra_run(&input, &plain))
}

#[test]
fn output_before_a_failure_is_kept() {
    let (opt, plain) = run_both("var a = 1\nvar b = 0\nimprimir(\"hola\", a / b, a / b)\n");
    for out in [&opt, &plain] {
        assert!(!out.status.success());
        assert_eq!(text(&out.stdout), "hola\n");
        assert!(text(&out.stderr).contains("division by zero"), "stderr:\n{}", text(&out.stderr));
    }
}

#[test]
fn optimizer_does_not_change_observable_behavior() {
    let programs = [
        "func f():\n  imprimir(\"f\")\n  retorno 1\nfin\nvar a = 4\nvar b = 2\nimprimir(f(), a / b, a / b)\n",
        "func doble(x):\n  retorno x * 2\nfin\nimprimir(doble(2), doble(doble(1)))\n",
        "imprimir(doble(2))\nfunc doble(x):\n  retorno x * 2\nfin\n",
        "func f():\n  garantia verdadero:\n    imprimir(1)\n  sino:\n    imprimir(2)\n  fin\nfin\nf()\n",
        "var total = 0\npara i in rango(10):\n  total = total + i * i\nfin\nimprimir(total, total * 2)\n",
    ];
    for src in programs {
        let (opt, plain) = run_both(src);
        assert_eq!(opt.status.success(), plain.status.success(), "program:\n{}", src);
        assert_eq!(text(&opt.stdout), text(&plain.stdout), "program:\n{}", src);
    }
}

#[test]
fn early_calls_and_literal_guards_are_rejected() {
    for src in [
        "imprimir(doble(2))\nfunc doble(x):\n  retorno x * 2\nfin\n",
        "func f():\n  garantia verdadero:\n    imprimir(1)\n  sino:\n    imprimir(2)\n  fin\nfin\nf()\n",
    ] {
        let (opt, _) = run_both(src);
        assert!(!opt.status.success(), "program ran:\n{}", src);
        assert!(opt.stdout.is_empty());
    }
}

#[test]
fn deep_recursion_runs_on_the_interpreter_stack() {
    let (opt, _) = run_both(
        "func f(n):\n  si n == 0:\n    retorno 0\n  fin\n  retorno 1 + f(n - 1)\nfin\nimprimir(f(62))\n",
    );
    assert!(opt.status.success(), "stderr:\n{}", text(&opt.stderr));
    assert_eq!(text(&opt.stdout), "62\n");
}
