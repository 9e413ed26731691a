//! Phylum - evolutionary, test-gated code repair
//!
//! Phylum breaks a plan into steps and, for each step, runs a population of
//! coding agents in isolated sandboxes. Every agent's change is scored by a
//! user-supplied test command. The first passing agent's patch is applied to
//! the repository; when nobody passes, the transcripts of the best attempts
//! are analysed into hypotheses that steer the next generation's prompts.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Adapters** (`adapters`): SQLite state, sandbox drivers, workflow
//!   engines, agent vendors and reasoners
//! - **Service Layer** (`services`): the evolution loop and the
//!   sandbox-side runner
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{AgentTask, Config, EvalSpec, Generation, Run, RunRequest, RunStatus, Step};
pub use domain::ports::{AgentVendor, Reasoner, RunRepository, SandboxDriver, WorkflowEngine};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{EvolutionOrchestrator, OrchestratorSettings};
