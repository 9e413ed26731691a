//! Domain layer for the Phylum orchestrator
//!
//! Models, port traits and the error taxonomy. Nothing in here performs I/O.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
