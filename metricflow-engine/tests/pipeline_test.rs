mod common;

use serde_json::json;

use common::{calls, load, run_to_end};
use metricflow_engine::{RunStatus, TaskError, TaskRun, Transition};
use metricflow_modules::MemoryBuffer;

#[test]
fn test_retry_budget_invokes_source_three_times() {
    let (_dir, flow) = load(
        r#"
flow: {version: v1}
sources:
  - type: flaky
    name: backend
    tasks:
      - name: always_failing
        cron: "* * * * *"
        max_retries: 2
        retry_delay: 0
        params: {counter: retry_budget, behavior: fail}
sinks: []
"#,
    );

    let mut run = TaskRun::new("always_failing");
    let first = run.attempt(&flow).unwrap();
    assert!(matches!(first, Transition::Retry { retry: 1, .. }));
    assert_eq!(run.status(), RunStatus::Retrying);

    let run = {
        while !run.status().is_terminal() {
            run.attempt(&flow).unwrap();
        }
        run
    };

    assert_eq!(calls("retry_budget"), 3);
    assert_eq!(run.status(), RunStatus::Failed);
    assert_eq!(run.attempts(), 3);

    let failure = run.last_failure().unwrap();
    assert_eq!(failure.module, "backend");
    assert!(failure.error.to_string().contains("backend unavailable"));

    // Only the first attempt is recorded
    let recorded = flow.recent_task_ids().snapshot();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].1, run.id());
}

#[test]
fn test_control_error_aborts_without_retry() {
    let (_dir, flow) = load(
        r#"
flow: {version: v1}
sources:
  - type: flaky
    tasks:
      - name: short_circuit
        cron: "* * * * *"
        max_retries: 5
        params: {counter: control, behavior: control}
sinks: []
"#,
    );

    let run = run_to_end(&flow, "short_circuit");
    assert_eq!(run.status(), RunStatus::Aborted);
    assert_eq!(calls("control"), 1);
    assert!(run.last_failure().unwrap().error.is_control());
}

#[test]
fn test_empty_frame_is_skipped() {
    let (_dir, flow) = load(
        r#"
flow: {version: v1}
sources:
  - type: flaky
    tasks:
      - name: quiet
        cron: "* * * * *"
        params: {counter: quiet}
transforms:
  - type: tag
    params: {label: never}
sinks:
  - type: memory
    params: {buffer: engine_skipped}
"#,
    );

    let run = run_to_end(&flow, "quiet");
    assert_eq!(run.status(), RunStatus::Skipped);
    assert!(run.status().is_success());
    assert!(MemoryBuffer::named("engine_skipped").is_empty());
}

#[test]
fn test_transforms_run_by_descending_priority() {
    let (_dir, flow) = load(
        r#"
flow: {version: v1}
sources:
  - type: flaky
    tasks:
      - name: ordered
        cron: "* * * * *"
        params:
          counter: ordered
          payload: [{metric: 1}]
transforms:
  - {type: tag, name: low, priority: -5, params: {label: low}}
  - {type: tag, name: first_tie, params: {label: first_tie}}
  - {type: tag, name: high, priority: 5, params: {label: high}}
  - {type: tag, name: second_tie, params: {label: second_tie}}
sinks:
  - type: memory
    params: {buffer: engine_priority}
"#,
    );

    let buffer = MemoryBuffer::named("engine_priority");
    assert_eq!(run_to_end(&flow, "ordered").status(), RunStatus::Finished);

    let frames = buffer.take();
    assert_eq!(frames.len(), 1);
    assert_eq!(
        frames[0][0].get("trail"),
        Some(json!(["high", "first_tie", "second_tie", "low"]))
    );
}

#[test]
fn test_sinks_receive_independent_copies() {
    let (_dir, flow) = load(
        r#"
flow: {version: v1}
sources:
  - type: flaky
    tasks:
      - name: copies
        cron: "* * * * *"
        params:
          counter: copies
          payload: [{metric: 1}, {metric: 2}]
sinks:
  - type: memory
    name: shifted
    modifiers: {time_offset: 1h}
    params: {buffer: engine_shifted}
  - type: memory
    name: plain
    params: {buffer: engine_plain}
"#,
    );

    assert_eq!(run_to_end(&flow, "copies").status(), RunStatus::Finished);

    let shifted = MemoryBuffer::named("engine_shifted").take();
    let plain = MemoryBuffer::named("engine_plain").take();
    assert_eq!(shifted.len(), 1);
    assert_eq!(plain.len(), 1);

    for (moved, original) in shifted[0].iter().zip(plain[0].iter()) {
        assert_eq!(
            original.timestamp() - moved.timestamp(),
            chrono::Duration::hours(1)
        );
    }
    assert!(!plain[0].is_frozen());
}

#[test]
fn test_routing_filters_select_sinks() {
    let (_dir, flow) = load(
        r#"
flow: {version: v1}
sources:
  - type: flaky
    tasks:
      - name: foobar_extra
        cron: "* * * * *"
        params: {counter: routing_a, payload: [{metric: 1}]}
      - name: foobar
        cron: "* * * * *"
        params: {counter: routing_b, payload: [{metric: 1}]}
sinks:
  - type: memory
    include_tasks: ["foo*"]
    exclude_tasks: [FOOBAR]
    params: {buffer: engine_routing}
"#,
    );

    run_to_end(&flow, "foobar_extra");
    run_to_end(&flow, "foobar");

    let names: Vec<String> = MemoryBuffer::named("engine_routing")
        .take()
        .iter()
        .map(|f| f.name().to_string())
        .collect();
    assert_eq!(names, vec!["foobar_extra"]);
}

#[test]
fn test_extraction_claims_each_key_once() {
    let (_dir, flow) = load(
        r#"
flow: {version: v1}
sources:
  - type: flaky
    tasks:
      - name: extract
        cron: "* * * * *"
        result: {metrics: [a, b]}
        static_attributes: {env: test}
        params:
          counter: extract
          payload: [{a: 1, b: 2, c: 3}]
sinks:
  - type: memory
    params: {buffer: engine_extract}
"#,
    );

    run_to_end(&flow, "extract");
    let frames = MemoryBuffer::named("engine_extract").take();
    let frame = &frames[0];
    assert_eq!(frame.len(), 2);
    for metric in frame.iter() {
        assert!(metric.get("a").is_none() || metric.field() == Some("a"));
        assert!(metric.attributes().get("a").is_none());
        assert!(metric.attributes().get("b").is_none());
        assert_eq!(metric.get("c"), Some(json!(3)));
        assert_eq!(metric.get("env"), Some(json!("test")));
    }
}

#[test]
fn test_terminal_run_cannot_be_attempted() {
    let (_dir, flow) = load(
        r#"
flow: {version: v1}
sources:
  - type: flaky
    tasks:
      - name: once
        cron: "* * * * *"
        params: {counter: terminal, payload: [{metric: 1}]}
sinks: []
"#,
    );

    let mut run = run_to_end(&flow, "once");
    assert_eq!(run.status(), RunStatus::Finished);
    assert!(matches!(
        run.attempt(&flow),
        Err(TaskError::InvalidTransition { .. })
    ));

    let mut unknown = TaskRun::new("missing");
    assert_eq!(
        unknown.attempt(&flow),
        Err(TaskError::UnknownTask("missing".to_string()))
    );
}
