use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;

use metricflow_config::{Field, Schema};
use metricflow_core::MetricFrame;
use metricflow_interfaces::{
    Module, ModuleError, ModuleResult, ModuleSpec, ModuleType, ProcessorType, Sink,
};

static BUFFERS: Lazy<Mutex<HashMap<String, MemoryBuffer>>> = Lazy::new(Default::default);

/// Shared list of frames received by memory sinks
#[derive(Debug, Clone, Default)]
pub struct MemoryBuffer {
    frames: Arc<Mutex<Vec<MetricFrame>>>,
}

impl MemoryBuffer {
    /// Process-wide buffer registered under `name`, created on first use
    pub fn named(name: &str) -> Self {
        BUFFERS.lock().entry(name.to_string()).or_default().clone()
    }

    pub fn push(&self, frame: MetricFrame) {
        self.frames.lock().push(frame);
    }

    /// Frames received so far, oldest first
    pub fn frames(&self) -> Vec<MetricFrame> {
        self.frames.lock().clone()
    }

    /// Remove and return every frame
    pub fn take(&self) -> Vec<MetricFrame> {
        std::mem::take(&mut *self.frames.lock())
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
    }
}

#[derive(Debug, Deserialize)]
struct Params {
    buffer: String,
}

/// Collects frame copies in a named [`MemoryBuffer`]
pub struct MemorySink {
    buffer: MemoryBuffer,
}

impl MemorySink {
    pub fn buffer(&self) -> &MemoryBuffer {
        &self.buffer
    }
}

impl Module for MemorySink {}

impl Sink for MemorySink {
    fn emit(&self, frame: MetricFrame) -> ModuleResult<()> {
        self.buffer.push(frame);
        Ok(())
    }
}

impl ModuleType for MemorySink {
    const TYPE_NAME: &'static str = "memory";
    const DOC: &'static str = "Keeps received frames in an in-process buffer.";

    fn create(spec: &ModuleSpec) -> ModuleResult<Self> {
        let params: Params = spec
            .params_as()
            .map_err(|e| ModuleError::config(e.to_string()))?;
        Ok(Self {
            buffer: MemoryBuffer::named(&params.buffer),
        })
    }
}

impl ProcessorType for MemorySink {
    fn params_schema() -> Schema {
        Schema::map(vec![Field::optional(
            "buffer",
            Schema::env(Schema::Str),
            json!("default"),
        )])
    }
}
