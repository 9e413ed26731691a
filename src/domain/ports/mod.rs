//! Port trait definitions (Hexagonal Architecture)
//!
//! Interfaces that adapters implement:
//! - RunRepository: durable run state
//! - WorkflowEngine: submit/poll/fetch/cancel of agent tasks
//! - SandboxDriver: isolated execution environments
//! - AgentVendor: prompt variants and task configuration per agent product
//! - Reasoner: language model calls for decomposition and analysis

pub mod reasoner;
pub mod run_repository;
pub mod sandbox_driver;
pub mod vendor;
pub mod workflow_engine;

pub use reasoner::Reasoner;
pub use run_repository::RunRepository;
pub use sandbox_driver::{SandboxDriver, SandboxState};
pub use vendor::{AgentInvocation, AgentVendor, TranscriptParser, VendorFactory};
pub use workflow_engine::{SandboxTask, TaskArtifacts, TaskHandle, WorkflowEngine};
