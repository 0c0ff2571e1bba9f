//! End-to-end runs of complete flow documents through the built-in modules

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use metricflow_cli::app::execute;
use metricflow_config::Settings;
use metricflow_engine::{Flow, FlowLoader, RunStatus};
use metricflow_modules::sinks::{render, OutputFormat};
use metricflow_modules::MemoryBuffer;

fn load(yaml: &str, configure: impl FnOnce(&mut Settings)) -> Result<(tempfile::TempDir, Flow)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("flow.yml");
    std::fs::write(&path, yaml)?;

    let mut settings = Settings::default();
    settings.config = path.to_string_lossy().into_owned();
    settings.run_once = true;
    configure(&mut settings);

    let registry = Arc::new(metricflow_modules::registry()?);
    let flow = FlowLoader::new(registry, settings).load()?;
    Ok((dir, flow))
}

const INVENTORY: &str = r#"
flow:
  version: v1
sources:
  - type: static
    name: inventory
    tasks:
      - name: disk_${host}
        cron: "*/5 * * * *"
        repeat_for:
          host: [web, db]
        result:
          metrics: [used_bytes, free_bytes]
        static_attributes:
          origin: inventory
        params:
          payload:
            - {host: "${host}", status: 1, used_bytes: 3000, free_bytes: 1000}
transforms:
  - type: key_mapping
    priority: 10
    params:
      key: status
      result_field: state
      mapping: {"1": up, "0": down}
  - type: simple_filter
    params:
      cond: "lt 2000"
      mode: drop
  - type: expression
    include_tasks: [disk_web]
    params:
      operations:
        - {op: scale, path: used_bytes, factor: 0.001}
        - {op: set, path: unit, value: kB}
sinks:
  - type: memory
    params: {buffer: e2e_inventory}
"#;

#[tokio::test]
async fn test_inventory_flow_end_to_end() -> Result<()> {
    let (_dir, flow) = load(INVENTORY, |s| s.allow_exec = true)?;
    let buffer = MemoryBuffer::named("e2e_inventory");
    buffer.clear();

    let statuses = execute(Arc::new(flow)).await?;
    assert_eq!(statuses, vec![RunStatus::Finished, RunStatus::Finished]);

    let mut frames = buffer.take();
    frames.sort_by(|a, b| a.name().cmp(b.name()));
    let names: Vec<&str> = frames.iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["disk_db", "disk_web"]);

    // free_bytes is below the filter threshold in both tasks
    let db = &frames[0];
    assert_eq!(db.len(), 1);
    assert_eq!(db[0].field(), Some("used_bytes"));
    assert_eq!(db[0].value_f64(), Some(3000.0));
    assert_eq!(db[0].get("state"), Some(json!("up")));
    assert_eq!(db[0].get("host"), Some(json!("db")));
    assert_eq!(db[0].get("origin"), Some(json!("inventory")));
    assert!(db[0].get("unit").is_none());

    let web = &frames[1];
    assert_eq!(web.len(), 1);
    assert_eq!(web[0].value_f64(), Some(3.0));
    assert_eq!(web[0].get("unit"), Some(json!("kB")));

    let lines = render(web, OutputFormat::JsonCompact)?;
    let document: serde_json::Value = serde_json::from_str(&lines[0])?;
    assert_eq!(document["used_bytes"], json!(3.0));
    assert_eq!(document["host"], json!("web"));
    assert!(document["timestamp"].as_str().unwrap_or_default().ends_with('Z'));
    Ok(())
}

#[test]
fn test_expression_requires_allow_exec() {
    let err = load(INVENTORY, |_| {}).unwrap_err();
    let startup = err
        .downcast_ref::<metricflow_engine::StartupError>()
        .expect("startup error");
    assert_eq!(startup.exit_code(), 1);
    assert!(err.to_string().contains("not allowed"));
}

#[tokio::test]
async fn test_disable_outputs_builds_sinks_disabled() -> Result<()> {
    let yaml = INVENTORY.replace("e2e_inventory", "e2e_inventory_disabled");
    let (_dir, flow) = load(&yaml, |s| {
        s.allow_exec = true;
        s.disable_outputs = true;
    })?;
    let buffer = MemoryBuffer::named("e2e_inventory_disabled");

    assert!(flow.sinks().iter().all(|s| !s.info.enabled));
    let statuses = execute(Arc::new(flow)).await?;
    assert!(statuses.iter().all(|s| *s == RunStatus::Finished));
    assert!(buffer.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_records_without_metrics() -> Result<()> {
    let yaml = r#"
flow:
  version: v1
sources:
  - type: static
    tasks:
      - name: labels
        cron: "* * * * *"
        params:
          payload: [{host: a}]
sinks:
  - type: memory
    params: {buffer: e2e_none_metric}
"#;

    let (_dir, flow) = load(yaml, |_| {})?;
    let statuses = execute(Arc::new(flow)).await?;
    assert_eq!(statuses, vec![RunStatus::Skipped]);

    let (_dir, flow) = load(yaml, |s| s.allow_none_metric = true)?;
    let statuses = execute(Arc::new(flow)).await?;
    assert_eq!(statuses, vec![RunStatus::Finished]);

    let frames = MemoryBuffer::named("e2e_none_metric").take();
    assert_eq!(frames.len(), 1);
    assert!(frames[0][0].value().is_none());
    assert_eq!(frames[0][0].get("host"), Some(json!("a")));
    Ok(())
}
