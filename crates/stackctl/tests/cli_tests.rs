//! End-to-end tests of the stackctl binary, using host steps only

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const STACK: &str = r#"
version: "1.0"
name: "demo"
services:
  mysql:
    image: "mysql:8.0"
    health_check:
      command: mysqladmin
      args: [ping]
  php:
    image: "laravel-php"
    depends_on: [mysql]
  nginx:
    image: "nginx"
    depends_on: [php]
operations:
  greet:
    description: "Say hello"
    steps:
      - action: host
        args: ["echo", "hello", "${1}"]
  broken:
    description: "Fails halfway"
    steps:
      - action: host
        args: ["touch", "first"]
      - action: host
        args: ["sh", "-c", "exit 3"]
      - action: host
        args: ["touch", "third"]
  setup:
    steps:
      - action: host
        args: ["cp", "${SOURCE:-.env.example}", ".env"]
"#;

struct TestStack {
    dir: tempfile::TempDir,
}

impl TestStack {
    fn new(yaml: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stack.yaml"), yaml).unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn stackctl(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_stackctl"))
            .arg("-c")
            .arg(self.path().join("stack.yaml"))
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_validate() {
    let stack = TestStack::new(STACK);
    let output = stack.stackctl(&["validate"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("✓ Configuration valid"));
    assert!(out.contains("Services: 3"));
    assert!(out.contains("Operations: 3"));
}

#[test]
fn test_validate_rejects_cycle() {
    let stack = TestStack::new(
        r#"
version: "1.0"
services:
  a:
    image: alpine
    depends_on: [b]
  b:
    image: alpine
    depends_on: [a]
"#,
    );
    let output = stack.stackctl(&["validate"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Circular dependency detected: a -> b -> a"));
}

#[test]
fn test_operation_as_subcommand() {
    let stack = TestStack::new(STACK);
    let output = stack.stackctl(&["greet", "world"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "hello world");
}

#[test]
fn test_failing_step_sets_exit_code() {
    let stack = TestStack::new(STACK);
    let output = stack.stackctl(&["run", "broken"]);

    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("failed at step 2 with exit code 3"));
    assert!(stack.path().join("first").exists());
    assert!(!stack.path().join("third").exists());
}

#[test]
fn test_unknown_operation() {
    let stack = TestStack::new(STACK);
    let output = stack.stackctl(&["deploy"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Unknown operation: deploy"));
}

#[test]
fn test_missing_argument() {
    let stack = TestStack::new(STACK);
    let output = stack.stackctl(&["greet"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Argument ${1} not provided"));
}

#[test]
fn test_dry_run_and_set() {
    let stack = TestStack::new(STACK);
    let output = stack.stackctl(&["--set", "SOURCE=.env.ci", "run", "--dry-run", "setup"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("1. host: cp .env.ci .env"));
    assert!(out.contains("$ cp .env.ci .env"));
    assert!(!stack.path().join(".env").exists());
}

#[test]
fn test_host_step_runs_in_config_dir() {
    let stack = TestStack::new(STACK);
    fs::write(stack.path().join(".env.example"), "APP_ENV=local\n").unwrap();

    let output = stack.stackctl(&["setup"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        fs::read_to_string(stack.path().join(".env")).unwrap(),
        "APP_ENV=local\n"
    );
}

#[test]
fn test_ops_lists_operations() {
    let stack = TestStack::new(STACK);
    let output = stack.stackctl(&["ops"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("greet"));
    assert!(out.contains("Say hello"));
    assert!(out.contains("up"));
    assert!(out.contains("(built-in)"));
}

#[test]
fn test_graph_prints_start_order() {
    let stack = TestStack::new(STACK);
    let output = stack.stackctl(&["graph"]);

    assert!(output.status.success());
    let lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(
        lines,
        vec![
            "mysql [health check]",
            "php -> mysql",
            "nginx -> php",
        ]
    );
}

#[test]
fn test_invalid_set_argument() {
    let stack = TestStack::new(STACK);
    let output = stack.stackctl(&["--set", "NOEQUALS", "ops"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("expected KEY=VALUE"));
}
