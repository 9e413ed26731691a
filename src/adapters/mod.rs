//! Infrastructure adapters for external systems.

pub mod reasoners;
pub mod sandbox;
pub mod sqlite;
pub mod vendors;
pub mod workflow;
