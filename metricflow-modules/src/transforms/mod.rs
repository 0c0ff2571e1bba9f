//! Built-in transforms

mod expression;
mod key_mapping;
mod simple_filter;

pub use expression::{Expression, Operation};
pub use key_mapping::{KeyMapping, MissingKey};
pub use simple_filter::{Condition, FilterMode, SimpleFilter};
