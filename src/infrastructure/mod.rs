//! Infrastructure layer module
//!
//! Configuration loading and logging setup. Adapters for external systems
//! live in `crate::adapters`.

pub mod config;
pub mod logging;
