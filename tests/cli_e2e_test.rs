//! Startup sequence of the command line application

use anyhow::Result;

use metricflow_cli::{exit_code, run};
use metricflow_modules::MemoryBuffer;

fn write_config(dir: &tempfile::TempDir, content: &str) -> Result<String> {
    let path = dir.path().join("flow.yml");
    std::fs::write(&path, content)?;
    Ok(path.to_string_lossy().into_owned())
}

const VALID: &str = r#"
flow:
  version: v1
  settings:
    hide_welcome: true
sources:
  - type: static
    tasks:
      - name: ping
        cron: "* * * * *"
        params:
          payload: {metric: 1}
sinks:
  - type: memory
    params: {buffer: cli_e2e}
"#;

#[tokio::test]
async fn test_only_validate_exits_cleanly() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_config(&dir, VALID)?;

    run(["metricflow", "--config", config.as_str(), "--only-validate"]).await?;
    assert!(MemoryBuffer::named("cli_e2e").is_empty());
    Ok(())
}

#[tokio::test]
async fn test_run_once_from_command_line() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_config(&dir, &VALID.replace("cli_e2e", "cli_e2e_once"))?;

    run([
        "metricflow",
        "--config",
        config.as_str(),
        "--run-once",
        "--log-level=warn",
        "--readiness-port",
        "0",
    ])
    .await?;

    let frames = MemoryBuffer::named("cli_e2e_once").take();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].name(), "ping");
    Ok(())
}

#[tokio::test]
async fn test_invalid_configuration_exits_with_two() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_config(&dir, "flow: {version: v2}\nsources: []\nsinks: []\n")?;

    let err = run(["metricflow", "--config", config.as_str(), "--only-validate"])
        .await
        .unwrap_err();
    assert_eq!(exit_code(&err), 2);
    Ok(())
}

#[tokio::test]
async fn test_missing_configuration_exits_with_one() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("absent.yml").to_string_lossy().into_owned();

    let err = run(["metricflow", "--config", missing.as_str()])
        .await
        .unwrap_err();
    assert_eq!(exit_code(&err), 1);
    Ok(())
}
