//! Error policy scenarios

mod helpers;

use helpers::{assert_completed, assert_failed, run_yaml};
use serde_json::json;
use stepflow::RunStatus;

#[tokio::test]
async fn test_failure_aborts_run_and_keeps_earlier_results() {
    let (outcome, probe) = run_yaml(
        r#"
name: abort
steps:
  - name: a
    component: probe
    params: { return: "from a" }
  - name: b
    component: fail
  - name: c
    component: probe
    params: { return: "from c" }
"#,
    )
    .await;

    assert_failed(&outcome, "b", "component");
    assert_eq!(outcome.results["a"], json!("from a"));
    assert!(!outcome.results.contains_key("c"));
    assert_eq!(probe.call_count(), 1);
}

#[tokio::test]
async fn test_ignore_errors_continues_without_a_result() {
    let (outcome, probe) = run_yaml(
        r#"
name: tolerant
steps:
  - name: a
    component: probe
    params: { return: "from a" }
  - name: b
    component: fail
    ignore_errors: true
  - name: c
    component: probe
    params: { return: "from c" }
"#,
    )
    .await;

    assert_completed(&outcome);
    assert_eq!(probe.call_count(), 2);
    assert_eq!(outcome.results["a"], json!("from a"));
    assert_eq!(outcome.results["c"], json!("from c"));
    assert!(!outcome.results.contains_key("b"));
}

#[tokio::test]
async fn test_unknown_component_fails_the_step() {
    let (outcome, _probe) = run_yaml(
        r#"
name: unknown
steps:
  - name: speak
    component: text_to_speech
"#,
    )
    .await;

    assert_failed(&outcome, "speak", "unknown_component");
}

#[tokio::test]
async fn test_missing_result_reference_is_resolution_error() {
    let (outcome, _probe) = run_yaml(
        r#"
name: missing-ref
steps:
  - name: echo
    component: probe
    params: { value: "${results.missing}" }
"#,
    )
    .await;

    assert_failed(&outcome, "echo", "resolution");
}

#[tokio::test]
async fn test_variable_set_into_variables_is_scope_violation() {
    let (outcome, _probe) = run_yaml(
        r#"
name: forbidden-write
variables:
  x: 1
steps:
  - name: clobber
    component: variable_set
    params: { name: x, value: 2, scope: variables }
"#,
    )
    .await;

    assert_failed(&outcome, "clobber", "scope_violation");
}

#[tokio::test]
async fn test_nested_failure_names_the_inner_step() {
    let (outcome, _probe) = run_yaml(
        r#"
name: nested-failure
steps:
  - name: repeat
    component: loop
    params:
      type: count
      iterations: 3
      steps:
        - name: inner
          component: fail
"#,
    )
    .await;

    // The loop does not catch the failure, and the error is attributed to
    // the step that raised it, not to the loop.
    assert_failed(&outcome, "inner", "component");
}

#[tokio::test]
async fn test_ignored_failure_inside_loop_keeps_iterating() {
    let (outcome, probe) = run_yaml(
        r#"
name: tolerant-loop
steps:
  - name: repeat
    component: loop
    params:
      type: count
      iterations: 3
      steps:
        - name: flaky
          component: fail
          ignore_errors: true
        - name: body
          component: probe
"#,
    )
    .await;

    assert_completed(&outcome);
    assert_eq!(probe.call_count(), 3);
}

#[tokio::test]
async fn test_expression_error_subject_to_ignore_errors() {
    let (outcome, probe) = run_yaml(
        r#"
name: bad-math
steps:
  - name: calc
    component: probe
    params: { value: "${1 / 0}" }
    ignore_errors: true
  - name: after
    component: probe
"#,
    )
    .await;

    assert_completed(&outcome);
    // The failing step never reached the component; only `after` ran.
    assert_eq!(probe.call_count(), 1);
    assert!(!outcome.results.contains_key("calc"));
}

#[tokio::test]
async fn test_expression_error_without_ignore_aborts() {
    let (outcome, _probe) = run_yaml(
        r#"
name: bad-math
steps:
  - name: calc
    component: probe
    params: { value: "${1 / 0}" }
"#,
    )
    .await;

    assert_failed(&outcome, "calc", "expression");
    assert!(outcome.error.unwrap().message.contains("division by zero"));
}

#[tokio::test]
async fn test_malformed_document_is_parse_error() {
    let err = stepflow::PipelineDefinition::from_yaml("name: broken\n").unwrap_err();
    assert!(matches!(err, stepflow::EngineError::Parse(_)));
}

#[tokio::test]
async fn test_partial_state_kept_on_failure() {
    let (outcome, _probe) = run_yaml(
        r#"
name: partial
steps:
  - name: seed
    component: variable_set
    params: { name: progress, value: "halfway" }
  - name: crash
    component: fail
"#,
    )
    .await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.state["progress"], json!("halfway"));
}
