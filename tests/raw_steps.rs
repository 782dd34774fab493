//! Shell escape-hatch scenarios

mod helpers;

use helpers::{assert_completed, assert_failed, run_yaml};
use serde_json::json;

#[tokio::test]
async fn test_shell_step_records_exit_code_and_output() {
    let (outcome, _probe) = run_yaml(
        r#"
name: shell
variables:
  who: world
steps:
  - name: greet
    type: shell
    command: "echo hello ${variables.who}"
"#,
    )
    .await;

    assert_completed(&outcome);
    assert_eq!(outcome.results["greet"]["exit_code"], json!(0));
    assert_eq!(outcome.results["greet"]["stdout"], json!("hello world"));
}

#[tokio::test]
async fn test_shell_output_flows_into_later_steps() {
    let (outcome, probe) = run_yaml(
        r#"
name: shell-chain
steps:
  - name: produce
    type: shell
    command: "echo payload"
  - name: consume
    component: probe
    params:
      upstream: "${results.produce.stdout}"
"#,
    )
    .await;

    assert_completed(&outcome);
    assert_eq!(probe.calls()[0]["upstream"], json!("payload"));
}

#[tokio::test]
async fn test_failing_shell_step_aborts_run() {
    let (outcome, probe) = run_yaml(
        r#"
name: shell-failure
steps:
  - name: crash
    type: shell
    command: "exit 7"
  - name: never
    component: probe
"#,
    )
    .await;

    assert_failed(&outcome, "crash", "component");
    assert_eq!(probe.call_count(), 0);
}

#[tokio::test]
async fn test_failing_shell_step_with_ignore_errors_continues() {
    let (outcome, probe) = run_yaml(
        r#"
name: tolerant-shell
steps:
  - name: crash
    type: shell
    command: "exit 7"
    ignore_errors: true
  - name: after
    component: probe
"#,
    )
    .await;

    assert_completed(&outcome);
    assert_eq!(probe.call_count(), 1);
    assert!(!outcome.results.contains_key("crash"));
}
