//! Built-in sinks

mod memory;
mod stdout;

pub use memory::{MemoryBuffer, MemorySink};
pub use stdout::{render, OutputFormat, StdoutSink};
