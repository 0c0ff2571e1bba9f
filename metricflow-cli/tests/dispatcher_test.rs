use std::sync::Arc;

use metricflow_cli::app::execute;
use metricflow_cli::dispatcher::{drive, Dispatcher};
use metricflow_config::Settings;
use metricflow_engine::{Flow, FlowLoader, RunStatus};
use metricflow_modules::MemoryBuffer;

fn load(yaml: &str, run_once: bool) -> (tempfile::TempDir, Flow) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flow.yml");
    std::fs::write(&path, yaml).unwrap();

    let mut settings = Settings::default();
    settings.config = path.to_string_lossy().into_owned();
    settings.run_once = run_once;

    let registry = Arc::new(metricflow_modules::registry().unwrap());
    let flow = FlowLoader::new(registry, settings).load().unwrap();
    (dir, flow)
}

#[tokio::test]
async fn test_run_once_runs_every_enabled_task() {
    let (_dir, flow) = load(
        r#"
flow:
  version: v1
sources:
  - type: static
    name: fixed
    tasks:
      - name: hosts
        cron: "* * * * *"
        params:
          payload:
            - {metric: 1, host: a}
            - {metric: 2, host: b}
      - name: nothing
        cron: "* * * * *"
      - name: off
        cron: "* * * * *"
        enabled: false
        params:
          payload: {metric: 3}
sinks:
  - type: memory
    params:
      buffer: cli_run_once
"#,
        true,
    );
    let buffer = MemoryBuffer::named("cli_run_once");
    buffer.clear();

    let statuses = execute(Arc::new(flow)).await.unwrap();
    assert_eq!(statuses, vec![RunStatus::Finished, RunStatus::Skipped]);

    let frames = buffer.take();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].name(), "hosts");
    assert_eq!(frames[0].len(), 2);
}

#[tokio::test]
async fn test_failing_task_is_retried_until_exhausted() {
    let (_dir, flow) = load(
        r#"
flow:
  version: v1
sources:
  - type: static
    name: fixed
    tasks:
      - name: broken
        cron: "0 0 * * *"
        max_retries: 2
        retry_delay: 0.01
        params:
          payload: {metric: 1}
transforms:
  - type: key_mapping
    params:
      mapping: {}
      key: absent
sinks: []
"#,
        false,
    );
    let flow = Arc::new(flow);

    let run = drive(flow.clone(), "broken".to_string()).await.unwrap();
    assert_eq!(run.status(), RunStatus::Failed);
    assert_eq!(run.attempts(), 3);
    assert!(run.last_failure().unwrap().module.starts_with("key_mapping"));
    assert_eq!(flow.recent_task_ids().len(), 1);
}

#[tokio::test]
async fn test_scheduler_stops_on_shutdown() {
    let (_dir, flow) = load(
        r#"
flow:
  version: v1
sources:
  - type: static
    tasks:
      - name: yearly
        cron: "0 0 1 1 *"
sinks: []
"#,
        false,
    );
    let dispatcher = Dispatcher::new(Arc::new(flow));

    tokio::time::timeout(std::time::Duration::from_secs(5), dispatcher.run(async {}))
        .await
        .unwrap();
    assert!(dispatcher.flow().recent_task_ids().is_empty());
}
