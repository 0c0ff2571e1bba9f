//! Built-in sources

mod static_source;

pub use static_source::StaticSource;
