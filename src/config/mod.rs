//! Configuration parsing and types.
//!
//! This module provides the configuration system for queuewarden:
//!
//! - `types` - Core config structure (`Config`, `PanelConfig`, `ServerEntry`, `LifecycleConfig`)
//! - `duration` - Human-readable duration strings ("120s", "500ms", "2m")
//! - `parser` - YAML config loading and validation

mod duration;
mod parser;
mod types;

pub use duration::*;
pub use parser::*;
pub use types::*;
