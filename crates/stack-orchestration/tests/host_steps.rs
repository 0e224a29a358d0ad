//! Operations made of host steps, run as real processes through the compose engine

use stack_config::{ResolutionContext, Topology};
use stack_orchestration::{ComposeEngine, Dispatcher, Error};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn load(dir: &Path, operations: &str) -> Dispatcher<ComposeEngine> {
    let yaml = format!(
        r#"
version: "1.0"
services:
  app:
    image: "alpine"
operations:
{operations}
"#
    );
    let path = dir.join("stack.yaml");
    fs::write(&path, yaml).unwrap();

    let topology = Arc::new(Topology::load(&path).unwrap());
    let engine = ComposeEngine::new(&topology).unwrap();
    Dispatcher::new(topology, engine)
}

#[smol_potat::test]
async fn test_failing_step_stops_the_operation() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = load(
        dir.path(),
        r#"
  three:
    steps:
      - action: host
        args: ["touch", "one"]
      - action: host
        args: ["sh", "-c", "touch two && exit 1"]
      - action: host
        args: ["touch", "three"]
"#,
    );

    let err = dispatcher
        .run("three", &[], &ResolutionContext::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::StepFailure {
            step_index: 1,
            exit_code: 1,
            ..
        }
    ));
    // Host steps run in the directory of the configuration file
    assert!(dir.path().join("one").exists());
    assert!(dir.path().join("two").exists());
    assert!(!dir.path().join("three").exists());
}

#[smol_potat::test]
async fn test_stdout_and_stdin_redirection() {
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump.txt");
    let copy = dir.path().join("copy.txt");
    let dispatcher = load(
        dir.path(),
        r#"
  backup:
    steps:
      - action: host
        args: ["echo", "${GREETING:-hello}"]
        stdout: "${1}"
  restore:
    steps:
      - action: host
        args: ["cat"]
        stdin: "${1}"
        stdout: "${2}"
"#,
    );

    let mut context = ResolutionContext::new();
    context.set_var("GREETING", "hello from backup");
    let dump_arg = dump.to_string_lossy().into_owned();
    let copy_arg = copy.to_string_lossy().into_owned();

    dispatcher
        .run("backup", &[dump_arg.clone()], &context)
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(&dump).unwrap(), "hello from backup\n");

    dispatcher
        .run("restore", &[dump_arg, copy_arg], &context)
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(&copy).unwrap(), "hello from backup\n");
}

#[smol_potat::test]
async fn test_timed_out_step_is_killed() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = load(
        dir.path(),
        r#"
  slow:
    steps:
      - action: host
        args: ["sh", "-c", "sleep 2 && touch late"]
        timeout: 1
"#,
    );

    let start = Instant::now();
    let err = dispatcher
        .run("slow", &[], &ResolutionContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StepTimeout { step_index: 0, .. }));
    assert!(start.elapsed() < Duration::from_secs(2));

    // Give the killed shell a chance to have run `touch` had it survived
    smol::Timer::after(Duration::from_millis(1500)).await;
    assert!(!dir.path().join("late").exists());
}
