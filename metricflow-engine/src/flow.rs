//! Flow context: module instances, tasks and run bookkeeping of one configuration
//!
//! A [`Flow`] is built from a strictly validated document. Construction instantiates
//! every module exactly once, creates the tasks of every source and checks the routing
//! filters. Afterwards the flow is read-only except for the recent task id buffer.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use metricflow_config::Settings;
use metricflow_core::MetricOptions;
use metricflow_interfaces::{
    Module, ModuleCategory, ModuleResult, ModuleSpec, Sink, Source, Transform,
};
use metricflow_registry::{ModuleHandle, ModuleRegistry};

use crate::error::{FlowError, FlowResult};
use crate::modifiers::IoModifiers;
use crate::routing::RoutingFilters;
use crate::task::Task;

/// Identity of a configured module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Unique resolved name
    pub name: String,
    pub type_name: String,
    pub category: ModuleCategory,
    /// Position in its configuration list
    pub index: usize,
    pub enabled: bool,
}

pub struct SourceInstance {
    pub info: InstanceInfo,
    pub modifiers: IoModifiers,
    pub module: Box<dyn Source>,
}

pub struct TransformInstance {
    pub info: InstanceInfo,
    pub filters: RoutingFilters,
    pub priority: i64,
    pub module: Box<dyn Transform>,
}

impl TransformInstance {
    pub fn accepts(&self, source: &str, task: &str, ignore_enabled: bool) -> bool {
        self.filters
            .accepts(self.info.enabled, source, task, ignore_enabled)
    }
}

pub struct SinkInstance {
    pub info: InstanceInfo,
    pub filters: RoutingFilters,
    pub modifiers: IoModifiers,
    pub module: Box<dyn Sink>,
}

impl SinkInstance {
    pub fn accepts(&self, source: &str, task: &str, ignore_enabled: bool) -> bool {
        self.filters
            .accepts(self.info.enabled, source, task, ignore_enabled)
    }
}

/// Bounded buffer of `(start time, run id)` of recently started task runs
#[derive(Debug)]
pub struct RecentTaskIds {
    capacity: usize,
    entries: Mutex<VecDeque<(DateTime<Utc>, Uuid)>>,
}

impl RecentTaskIds {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.clamp(1, 4096))),
        }
    }

    /// Append an id, evicting the oldest entry when full
    pub fn push(&self, timestamp: DateTime<Utc>, id: Uuid) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back((timestamp, id));
    }

    /// Entries, oldest first
    pub fn snapshot(&self) -> Vec<(DateTime<Utc>, Uuid)> {
        self.entries.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Serialize with object keys sorted at every level
fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = Map::new();
                for key in keys {
                    out.insert(key.clone(), sorted(&map[key]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

/// Name of a module entry: its configured name or one derived from its content
pub fn resolve_name(type_name: &str, config: &Value) -> String {
    if let Some(name) = config.get("name").and_then(Value::as_str) {
        return name.to_string();
    }
    let digest = Sha256::digest(canonical_json(config).as_bytes());
    let hash = hex::encode(digest);
    format!("{type_name}_{}", &hash[..8]).to_lowercase()
}

/// A validated configuration turned into module instances and tasks
pub struct Flow {
    settings: Arc<Settings>,
    configuration: Value,
    path: Option<PathBuf>,
    sources: Vec<SourceInstance>,
    transforms: Vec<TransformInstance>,
    sinks: Vec<SinkInstance>,
    disabled: Vec<InstanceInfo>,
    tasks: Vec<Task>,
    recent_ids: RecentTaskIds,
    ready: AtomicBool,
}

struct Builder<'a> {
    registry: &'a ModuleRegistry,
    settings: Arc<Settings>,
    names: HashSet<String>,
    disabled: Vec<InstanceInfo>,
}

impl Builder<'_> {
    /// Instantiate one module entry, or `None` when it was only shape-checked
    fn instantiate(
        &mut self,
        category: ModuleCategory,
        index: usize,
        config: &Value,
    ) -> FlowResult<Option<(InstanceInfo, ModuleHandle)>> {
        let type_name = config
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let name = resolve_name(&type_name, config);

        if !self.names.insert(name.clone()) {
            tracing::error!(target: "flow", module = %name, "Duplicate module name");
            return Err(FlowError::DuplicateModule { name });
        }

        let mut enabled = config.get("enabled").and_then(Value::as_bool).unwrap_or(true);
        if category == ModuleCategory::Sink && self.settings.disable_outputs {
            enabled = false;
        }

        let info = InstanceInfo {
            name: name.clone(),
            type_name: type_name.clone(),
            category,
            index,
            enabled,
        };

        if !enabled && self.settings.skip_disabled_validation {
            tracing::debug!(target: "flow", module = %name, "Skipping disabled module");
            self.disabled.push(info);
            return Ok(None);
        }

        let descriptor = self.registry.get(category, &type_name)?;
        let spec = ModuleSpec {
            type_name,
            name: name.clone(),
            index,
            connection: config.get("connection").cloned().unwrap_or(Value::Null),
            params: config.get("params").cloned().unwrap_or(Value::Null),
            settings: self.settings.clone(),
        };

        let handle = descriptor
            .instantiate(&spec)
            .map_err(|source| FlowError::Module { name, source })?;

        tracing::debug!(
            target: "flow",
            module = %info.name,
            category = %category,
            enabled = info.enabled,
            "Created module"
        );
        Ok(Some((info, handle)))
    }
}

fn entries<'a>(configuration: &'a Value, category: ModuleCategory) -> &'a [Value] {
    configuration
        .get(category.config_key())
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

impl Flow {
    /// Build a flow from a strictly validated document
    pub fn build(
        configuration: Value,
        settings: Settings,
        registry: &ModuleRegistry,
    ) -> FlowResult<Self> {
        let settings = Arc::new(settings);
        let mut builder = Builder {
            registry,
            settings: settings.clone(),
            names: HashSet::new(),
            disabled: Vec::new(),
        };

        tracing::debug!(target: "flow", "Building sources...");
        let mut sources = Vec::new();
        let mut tasks: Vec<Task> = Vec::new();
        let mut task_names = HashSet::new();

        for (index, config) in entries(&configuration, ModuleCategory::Source).iter().enumerate() {
            let Some((info, handle)) = builder.instantiate(ModuleCategory::Source, index, config)?
            else {
                continue;
            };
            let ModuleHandle::Source(module) = handle else {
                continue;
            };

            for task_config in config.get("tasks").and_then(Value::as_array).into_iter().flatten() {
                let task = Task::from_config(
                    &info.name,
                    info.enabled,
                    task_config,
                    &settings.task_name_prefix,
                )?;
                if !task_names.insert(task.name.clone()) {
                    tracing::error!(target: "flow", task = %task.name, "Task with name already exists!");
                    return Err(FlowError::DuplicateTask { name: task.name });
                }
                tracing::debug!(
                    target: "flow",
                    task = %task.name,
                    enabled = task.enabled,
                    "Created task"
                );
                tasks.push(task);
            }

            sources.push(SourceInstance {
                modifiers: IoModifiers::from_config(config)?,
                info,
                module,
            });
        }

        tracing::debug!(target: "flow", "Building transforms...");
        let mut transforms = Vec::new();
        for (index, config) in entries(&configuration, ModuleCategory::Transform)
            .iter()
            .enumerate()
        {
            let Some((info, handle)) =
                builder.instantiate(ModuleCategory::Transform, index, config)?
            else {
                continue;
            };
            let ModuleHandle::Transform(module) = handle else {
                continue;
            };
            transforms.push(TransformInstance {
                filters: RoutingFilters::from_config(config)?,
                priority: config.get("priority").and_then(Value::as_i64).unwrap_or(0),
                info,
                module,
            });
        }
        // Stable: equal priorities keep declaration order
        transforms.sort_by(|a, b| b.priority.cmp(&a.priority));

        tracing::debug!(target: "flow", "Building sinks...");
        let mut sinks = Vec::new();
        for (index, config) in entries(&configuration, ModuleCategory::Sink).iter().enumerate() {
            let Some((info, handle)) = builder.instantiate(ModuleCategory::Sink, index, config)?
            else {
                continue;
            };
            let ModuleHandle::Sink(module) = handle else {
                continue;
            };
            sinks.push(SinkInstance {
                filters: RoutingFilters::from_config(config)?,
                modifiers: IoModifiers::from_config(config)?,
                info,
                module,
            });
        }

        let flow = Self {
            recent_ids: RecentTaskIds::new(settings.task_id_queue_size),
            ready: AtomicBool::new(false),
            settings,
            configuration,
            path: None,
            sources,
            transforms,
            sinks,
            disabled: builder.disabled,
            tasks,
        };

        flow.check_filters();
        tracing::info!(
            target: "flow",
            "Successfully configured {} source(s), {} transform(s) and {} sink(s).",
            flow.sources.len(),
            flow.transforms.len(),
            flow.sinks.len()
        );
        Ok(flow)
    }

    /// Remember the path the configuration was loaded from
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The validated configuration document
    pub fn configuration(&self) -> &Value {
        &self.configuration
    }

    pub fn sources(&self) -> &[SourceInstance] {
        &self.sources
    }

    /// Transforms in execution order
    pub fn transforms(&self) -> &[TransformInstance] {
        &self.transforms
    }

    pub fn sinks(&self) -> &[SinkInstance] {
        &self.sinks
    }

    /// Modules that were neither validated nor instantiated because they are disabled
    pub fn skipped_modules(&self) -> &[InstanceInfo] {
        &self.disabled
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn source(&self, name: &str) -> Option<&SourceInstance> {
        self.sources.iter().find(|s| s.info.name == name)
    }

    /// Options of frames produced by this flow's tasks
    pub fn metric_options(&self) -> MetricOptions {
        MetricOptions {
            separator: self.settings.nested_attr_separator.clone(),
            allow_absent: self.settings.allow_none_metric,
        }
    }

    /// Transforms accepting a source/task pair, in execution order
    pub fn transforms_for<'a>(
        &'a self,
        source: &'a str,
        task: &'a str,
    ) -> impl Iterator<Item = &'a TransformInstance> + 'a {
        self.transforms
            .iter()
            .filter(move |t| t.accepts(source, task, false))
    }

    /// Sinks accepting a source/task pair
    pub fn sinks_for<'a>(
        &'a self,
        source: &'a str,
        task: &'a str,
    ) -> impl Iterator<Item = &'a SinkInstance> + 'a {
        self.sinks
            .iter()
            .filter(move |s| s.accepts(source, task, false))
    }

    /// Names of the modules a task's data passes through, source first
    pub fn chain(&self, task: &Task, ignore_enabled: bool) -> Vec<&InstanceInfo> {
        let mut chain = Vec::new();
        if let Some(source) = self.source(&task.source) {
            chain.push(&source.info);
        }
        chain.extend(
            self.transforms
                .iter()
                .filter(|t| t.accepts(&task.source, &task.name, ignore_enabled))
                .map(|t| &t.info),
        );
        chain.extend(
            self.sinks
                .iter()
                .filter(|s| s.accepts(&task.source, &task.name, ignore_enabled))
                .map(|s| &s.info),
        );
        chain
    }

    /// Warn about routing filters matching no source or task, returning the warnings
    pub fn check_filters(&self) -> Vec<String> {
        tracing::debug!(target: "flow", "Validating routes...");
        let sources: Vec<&str> = self.sources.iter().map(|s| s.info.name.as_str()).collect();
        let tasks: Vec<&str> = self.tasks.iter().map(|t| t.name.as_str()).collect();

        let processors = self
            .transforms
            .iter()
            .map(|t| (&t.info, &t.filters))
            .chain(self.sinks.iter().map(|s| (&s.info, &s.filters)));

        let mut all = Vec::new();
        for (info, filters) in processors {
            for warning in filters.unmatched(&sources, &tasks) {
                tracing::warn!(target: "flow", module = %info.name, "{}", warning);
                all.push(warning);
            }
        }
        tracing::info!(target: "flow", "Validated task routing.");
        all
    }

    pub fn recent_task_ids(&self) -> &RecentTaskIds {
        &self.recent_ids
    }

    /// Call a lifecycle hook of every enabled module
    ///
    /// With `stop_on_error` the first failure is returned, otherwise failures are logged
    /// and the remaining modules still run their hook.
    fn run_hook(&self, hook: Hook, stop_on_error: bool) -> FlowResult<()> {
        let sources = self
            .sources
            .iter()
            .filter(|s| s.info.enabled)
            .map(|s| (&s.info, call_hook(s.module.as_ref(), hook)));
        let transforms = self
            .transforms
            .iter()
            .filter(|t| t.info.enabled)
            .map(|t| (&t.info, call_hook(t.module.as_ref(), hook)));
        let sinks = self
            .sinks
            .iter()
            .filter(|s| s.info.enabled)
            .map(|s| (&s.info, call_hook(s.module.as_ref(), hook)));

        for (info, result) in sources.chain(transforms).chain(sinks) {
            let Err(source) = result else {
                continue;
            };
            if stop_on_error {
                return Err(FlowError::Module {
                    name: info.name.clone(),
                    source,
                });
            }
            tracing::error!(
                target: "flow",
                module = %info.name,
                hook = hook.as_str(),
                error = %source,
                "Lifecycle hook failed"
            );
        }
        Ok(())
    }

    /// Run `on_connect` of every enabled module
    pub fn connect(&self) -> FlowResult<()> {
        tracing::debug!(target: "flow", "Preparing flow modules...");
        self.run_hook(Hook::Connect, true)?;
        self.ready.store(true, Ordering::SeqCst);
        tracing::info!(target: "flow", "Flow modules are ready.");
        Ok(())
    }

    /// Whether every module connected and the flow has not shut down
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Run `on_pre_shutdown` then `on_shutdown` of every enabled module
    ///
    /// Hook failures are logged and do not stop the remaining modules.
    pub fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
        tracing::info!(target: "flow", "Cleaning up and flushing modules...");
        let _ = self.run_hook(Hook::PreShutdown, false);

        tracing::info!(target: "flow", "Shutting down flow modules...");
        let _ = self.run_hook(Hook::Shutdown, false);
    }
}

#[derive(Debug, Clone, Copy)]
enum Hook {
    Connect,
    PreShutdown,
    Shutdown,
}

impl Hook {
    fn as_str(&self) -> &'static str {
        match self {
            Hook::Connect => "on_connect",
            Hook::PreShutdown => "on_pre_shutdown",
            Hook::Shutdown => "on_shutdown",
        }
    }
}

fn call_hook<M: Module + ?Sized>(module: &M, hook: Hook) -> ModuleResult<()> {
    match hook {
        Hook::Connect => module.on_connect(),
        Hook::PreShutdown => module.on_pre_shutdown(),
        Hook::Shutdown => module.on_shutdown(),
    }
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("path", &self.path)
            .field("sources", &self.sources.iter().map(|s| &s.info.name).collect::<Vec<_>>())
            .field(
                "transforms",
                &self.transforms.iter().map(|t| &t.info.name).collect::<Vec<_>>(),
            )
            .field("sinks", &self.sinks.iter().map(|s| &s.info.name).collect::<Vec<_>>())
            .field("tasks", &self.tasks.iter().map(|t| &t.name).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let ids = RecentTaskIds::new(2);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();
        let now = Utc::now();

        ids.push(now, first);
        ids.push(now, second);
        ids.push(now, third);

        let kept: Vec<Uuid> = ids.snapshot().into_iter().map(|(_, id)| id).collect();
        assert_eq!(kept, vec![second, third]);
        assert_eq!(ids.capacity(), 2);
    }

    #[test]
    fn test_ring_buffer_concurrent_pushes() {
        let ids = Arc::new(RecentTaskIds::new(1000));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        ids.push(Utc::now(), Uuid::new_v4());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ids.len(), 400);
    }

    #[test]
    fn test_resolved_names() {
        assert_eq!(resolve_name("static", &json!({"name": "mine"})), "mine");

        let a = resolve_name("static", &json!({"name": null, "type": "static", "x": 1}));
        let b = resolve_name("static", &json!({"x": 1, "type": "static", "name": null}));
        assert_eq!(a, b);
        assert!(a.starts_with("static_"));
        assert_eq!(a.len(), "static_".len() + 8);

        let c = resolve_name("static", &json!({"name": null, "type": "static", "x": 2}));
        assert_ne!(a, c);
    }
}
