use std::fs;
use std::process::{Command, Output};

fn bin() -> String {
    // Cargo sets this for bin targets in integration tests
    env!("CARGO_BIN_EXE_cobra").to_string()
}

fn cobra(args: &[&str]) -> Output {
    Command::new(bin()).args(args).env_remove("COBRA_LOG").output().expect("run")
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[test]
fn run_prints_program_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("hola.co");
    fs::write(&input, "var x = 3\nimprimir(x)\n").unwrap();
    let config = dir.path().join("cobra.toml");
    fs::write(&config, "").unwrap();

    let output = cobra(&["run", input.to_str().unwrap(), "--config", config.to_str().unwrap()]);
    assert!(output.status.success(), "stderr:\n{}", text(&output.stderr));
    assert_eq!(text(&output.stdout), "3\n");
}

#[test]
fn run_resolves_imports_next_to_the_script() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("util.co"), "func doble(x):\n  retorno x * 2\nfin\n").unwrap();
    let input = dir.path().join("main.co");
    fs::write(&input, "desde \"util\" import doble\nimprimir(doble(21))\n").unwrap();
    let config = dir.path().join("cobra.toml");
    fs::write(&config, "").unwrap();

    let output = cobra(&["run", input.to_str().unwrap(), "--config", config.to_str().unwrap()]);
    assert!(output.status.success(), "stderr:\n{}", text(&output.stderr));
    assert_eq!(text(&output.stdout), "42\n");
}

#[test]
fn check_reports_semantic_errors_and_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("malo.co");
    fs::write(&input, "imprimir(nadie)\n").unwrap();
    let config = dir.path().join("cobra.toml");
    fs::write(&config, "").unwrap();

    let output = cobra(&["check", input.to_str().unwrap(), "--config", config.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(text(&output.stderr).contains("nadie"), "stderr:\n{}", text(&output.stderr));
}

#[test]
fn tokens_and_ast_dump() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("x.co");
    fs::write(&input, "var x = 5\n").unwrap();

    let output = cobra(&["tokens", input.to_str().unwrap()]);
    assert!(output.status.success(), "stderr:\n{}", text(&output.stderr));
    assert_eq!(text(&output.stdout).lines().count(), 5);

    let output = cobra(&["ast", input.to_str().unwrap(), "--json"]);
    assert!(output.status.success(), "stderr:\n{}", text(&output.stderr));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json[0]["Assignment"].is_object(), "{}", json);
}

#[test]
fn node_limit_flag_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("largo.co");
    fs::write(&input, "imprimir(1)\nimprimir(2)\n").unwrap();
    let config = dir.path().join("cobra.toml");
    fs::write(&config, "").unwrap();

    let output = cobra(&["run", input.to_str().unwrap(), "--config", config.to_str().unwrap(), "--node-limit", "1"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}
