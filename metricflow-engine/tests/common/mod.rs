//! Test modules and helpers shared by the engine integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use metricflow_config::{Field, Schema, Settings};
use metricflow_core::MetricFrame;
use metricflow_engine::{Flow, FlowLoader, RunStatus, StartupError, TaskRun};
use metricflow_interfaces::{
    Module, ModuleError, ModuleResult, ModuleSpec, ModuleType, ProcessorType, Record, Source,
    SourceType, Transform,
};
use metricflow_registry::{ModuleDescriptor, ModuleRegistry};

static CALLS: Lazy<Mutex<HashMap<String, usize>>> = Lazy::new(Default::default);

/// Number of fetches made with the given `counter` parameter
pub fn calls(counter: &str) -> usize {
    CALLS.lock().get(counter).copied().unwrap_or(0)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Behavior {
    Ok,
    Fail,
    Control,
}

#[derive(Debug, Deserialize)]
struct FetchParams {
    counter: String,
    behavior: Behavior,
    payload: Vec<Record>,
}

/// Source counting its fetches, failing on request
pub struct FlakySource;

impl Module for FlakySource {}

impl Source for FlakySource {
    fn fetch(&self, params: Value) -> ModuleResult<Vec<Record>> {
        let params: FetchParams =
            serde_json::from_value(params).map_err(|e| ModuleError::config(e.to_string()))?;
        *CALLS.lock().entry(params.counter).or_default() += 1;

        match params.behavior {
            Behavior::Ok => Ok(params.payload),
            Behavior::Fail => Err(ModuleError::connection("backend unavailable")),
            Behavior::Control => Err(ModuleError::control("nothing to collect today")),
        }
    }
}

impl ModuleType for FlakySource {
    const TYPE_NAME: &'static str = "flaky";
    const DOC: &'static str = "Counts fetches and fails on request.";

    fn create(_spec: &ModuleSpec) -> ModuleResult<Self> {
        Ok(Self)
    }
}

impl SourceType for FlakySource {
    fn task_params_schema() -> Schema {
        Schema::map(vec![
            Field::required("counter", Schema::Str),
            Field::optional("behavior", Schema::one_of(["ok", "fail", "control"]), "ok"),
            Field::optional(
                "payload",
                Schema::always_list(Schema::dict(Schema::Any)),
                json!([]),
            ),
        ])
    }
}

/// Appends its label to the `trail` attribute of every metric
pub struct Tag {
    label: String,
}

impl Module for Tag {}

impl Transform for Tag {
    fn apply(&self, frame: &mut MetricFrame) -> ModuleResult<()> {
        for metric in frame.iter_mut()? {
            let mut trail = match metric.get("trail") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            trail.push(Value::String(self.label.clone()));
            metric.set("trail", Value::Array(trail))?;
        }
        Ok(())
    }
}

impl ModuleType for Tag {
    const TYPE_NAME: &'static str = "tag";
    const DOC: &'static str = "Records the order transforms ran in.";

    fn create(spec: &ModuleSpec) -> ModuleResult<Self> {
        let label = spec
            .params
            .get("label")
            .and_then(Value::as_str)
            .ok_or_else(|| ModuleError::config("label is required"))?;
        Ok(Self {
            label: label.to_string(),
        })
    }
}

impl ProcessorType for Tag {
    fn params_schema() -> Schema {
        Schema::map(vec![Field::required("label", Schema::Str)])
    }
}

/// Built-in modules plus the test modules above
pub fn registry() -> Arc<ModuleRegistry> {
    let mut descriptors = metricflow_modules::builtin();
    descriptors.push(ModuleDescriptor::source::<FlakySource>());
    descriptors.push(ModuleDescriptor::transform::<Tag>());
    Arc::new(ModuleRegistry::with_modules(descriptors).unwrap())
}

/// Write `content` to `name` inside `dir`
pub fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Load the flow document at `path`
pub fn load_with(path: &Path, mut settings: Settings) -> Result<Flow, StartupError> {
    settings.config = path.to_string_lossy().into_owned();
    FlowLoader::new(registry(), settings).load()
}

/// Load a flow from YAML text with default settings
pub fn load(yaml: &str) -> (tempfile::TempDir, Flow) {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "flow.yml", yaml);
    let flow = load_with(&path, Settings::default()).unwrap();
    (dir, flow)
}

/// Attempt a run of `task` until it is terminal, ignoring retry delays
pub fn run_to_end(flow: &Flow, task: &str) -> TaskRun {
    let mut run = TaskRun::new(task);
    while !run.status().is_terminal() {
        run.attempt(flow).unwrap();
    }
    assert_ne!(run.status(), RunStatus::Retrying);
    run
}
