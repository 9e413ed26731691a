//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber, with optional
//! rolling JSON log files.

pub mod logger;

pub use logger::{parse_log_level, LoggerImpl};
