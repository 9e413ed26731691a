//! Hypothesis domain model.
//!
//! A hypothesis is produced once per failed generation and consumed by the
//! next generation's prompt construction.

use serde::{Deserialize, Serialize};

/// Aspect of prompt construction a hypothesis recommends varying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptDimension {
    /// Overall approach the agent is steered toward.
    Strategy,
    /// How much explanation and detail the prompt asks for.
    Verbosity,
    /// Whether the task or the context is presented first.
    InstructionOrder,
    /// Which part of the codebase the agent should focus on.
    Scope,
    /// How the agent should validate its own work.
    Testing,
    Other,
}

impl Default for PromptDimension {
    fn default() -> Self {
        Self::Other
    }
}

impl PromptDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strategy => "strategy",
            Self::Verbosity => "verbosity",
            Self::InstructionOrder => "instruction_order",
            Self::Scope => "scope",
            Self::Testing => "testing",
            Self::Other => "other",
        }
    }

    /// Lenient parse used on model output; unknown tags map to `Other`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "strategy" | "approach" => Self::Strategy,
            "verbosity" | "detail" => Self::Verbosity,
            "instruction_order" | "ordering" | "order" => Self::InstructionOrder,
            "scope" | "focus" => Self::Scope,
            "testing" | "tests" | "validation" => Self::Testing,
            _ => Self::Other,
        }
    }
}

/// A rationale-backed directive for mutating prompts between generations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Why the reasoner thinks this will help.
    pub rationale: String,
    /// Aspect of the prompt the directive changes.
    pub dimension: PromptDimension,
    /// Concrete instruction to fold into the next prompt.
    pub directive: String,
    /// True when produced by the fallback rather than a comparison.
    #[serde(default)]
    pub generic: bool,
}

impl Hypothesis {
    pub fn new(
        dimension: PromptDimension,
        rationale: impl Into<String>,
        directive: impl Into<String>,
    ) -> Self {
        Self {
            rationale: rationale.into(),
            dimension,
            directive: directive.into(),
            generic: false,
        }
    }

    /// Directives used when a comparison yields no discriminating signal.
    pub fn generic_fallback() -> Vec<Self> {
        vec![
            Self {
                rationale: "No discriminating signal between top and bottom agents".to_string(),
                dimension: PromptDimension::Strategy,
                directive: "Try a different overall approach than the previous attempt".to_string(),
                generic: true,
            },
            Self {
                rationale: "No discriminating signal between top and bottom agents".to_string(),
                dimension: PromptDimension::Verbosity,
                directive: "Change how much detail and explanation is requested".to_string(),
                generic: true,
            },
        ]
    }
}
