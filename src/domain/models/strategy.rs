//! Prompt strategy model.
//!
//! A strategy is the structured half of a prompt variant: which approach the
//! agent is steered toward, how verbose the instructions are, in what order
//! they are presented, and what accumulated guidance is appended. Vendors
//! own the approach texts; the strategy only stores an index into them.

use serde::{Deserialize, Serialize};

use super::hypothesis::{Hypothesis, PromptDimension};

/// How much guidance a prompt carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Concise,
    Detailed,
}

impl Verbosity {
    pub fn toggled(self) -> Self {
        match self {
            Self::Concise => Self::Detailed,
            Self::Detailed => Self::Concise,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concise => "concise",
            Self::Detailed => "detailed",
        }
    }
}

/// Whether the task or the guidance comes first in a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionOrder {
    TaskFirst,
    ContextFirst,
}

impl InstructionOrder {
    pub fn flipped(self) -> Self {
        match self {
            Self::TaskFirst => Self::ContextFirst,
            Self::ContextFirst => Self::TaskFirst,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskFirst => "task_first",
            Self::ContextFirst => "context_first",
        }
    }
}

/// Structured prompt variant for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromptStrategy {
    pub approach: usize,
    pub verbosity: Verbosity,
    pub order: InstructionOrder,
    #[serde(default)]
    pub guidance: Vec<String>,
    #[serde(default)]
    pub learnings: Vec<String>,
}

impl PromptStrategy {
    /// Baseline strategy for variant `index`.
    ///
    /// Distinct for every index below `approach_count * 4`; beyond that the
    /// sequence wraps and variants repeat.
    pub fn baseline(index: u32, approach_count: usize) -> Self {
        let approaches = approach_count.max(1);
        let i = index as usize;
        let rest = i / approaches;
        Self {
            approach: i % approaches,
            verbosity: if rest % 2 == 0 { Verbosity::Concise } else { Verbosity::Detailed },
            order: if (rest / 2) % 2 == 0 {
                InstructionOrder::TaskFirst
            } else {
                InstructionOrder::ContextFirst
            },
            guidance: Vec::new(),
            learnings: Vec::new(),
        }
    }

    /// Apply hypotheses to produce the next generation's strategy.
    ///
    /// Every transformation is applied uniformly, so siblings that were
    /// distinct before mutation stay distinct after it.
    pub fn mutate(&self, hypotheses: &[Hypothesis], approach_count: usize) -> Self {
        let approaches = approach_count.max(1);
        let mut next = self.clone();

        for hypothesis in hypotheses {
            match hypothesis.dimension {
                PromptDimension::Strategy => next.approach = (next.approach + 1) % approaches,
                PromptDimension::Verbosity => next.verbosity = next.verbosity.toggled(),
                PromptDimension::InstructionOrder => next.order = next.order.flipped(),
                PromptDimension::Scope | PromptDimension::Testing | PromptDimension::Other => {
                    push_unique(&mut next.guidance, &hypothesis.directive);
                }
            }
            push_unique(&mut next.learnings, &hypothesis.rationale);
        }

        next
    }

    /// Render a full prompt around `task` given the vendor's approach text.
    pub fn render(&self, task: &str, approach_text: &str) -> String {
        let mut context = vec![format!("Approach: {approach_text}")];
        context.push(match self.verbosity {
            Verbosity::Concise => {
                "Keep changes minimal and explanations brief.".to_string()
            }
            Verbosity::Detailed => {
                "Explain your reasoning before each change and be thorough.".to_string()
            }
        });

        if !self.guidance.is_empty() {
            let lines: Vec<String> = self.guidance.iter().map(|g| format!("- {g}")).collect();
            context.push(format!("Additional guidance:\n{}", lines.join("\n")));
        }

        if !self.learnings.is_empty() {
            let lines: Vec<String> = self.learnings.iter().map(|l| format!("- {l}")).collect();
            context.push(format!("Learnings from previous attempts:\n{}", lines.join("\n")));
        }

        let context = context.join("\n\n");
        match self.order {
            InstructionOrder::TaskFirst => format!("{task}\n\n{context}"),
            InstructionOrder::ContextFirst => format!("{context}\n\nTask:\n{task}"),
        }
    }

    /// Short label for tables and logs.
    pub fn label(&self) -> String {
        format!(
            "a{}/{}/{}{}",
            self.approach,
            self.verbosity.as_str(),
            self.order.as_str(),
            if self.guidance.is_empty() { String::new() } else { format!("+{}", self.guidance.len()) }
        )
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    let item = item.trim();
    if !item.is_empty() && !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_baseline_strategies_are_distinct() {
        let approaches = 5;
        let strategies: HashSet<PromptStrategy> =
            (0..20).map(|i| PromptStrategy::baseline(i, approaches)).collect();
        assert_eq!(strategies.len(), 20);
    }

    #[test]
    fn test_baseline_wraps_past_combinations() {
        assert_eq!(PromptStrategy::baseline(0, 2), PromptStrategy::baseline(8, 2));
    }

    #[test]
    fn test_mutation_preserves_distinctness() {
        let hypotheses = vec![
            Hypothesis::new(PromptDimension::Strategy, "r1", "d1"),
            Hypothesis::new(PromptDimension::Testing, "r2", "run the tests first"),
        ];
        let mutated: HashSet<PromptStrategy> = (0..6)
            .map(|i| PromptStrategy::baseline(i, 5).mutate(&hypotheses, 5))
            .collect();
        assert_eq!(mutated.len(), 6);
    }

    #[test]
    fn test_mutation_by_dimension() {
        let base = PromptStrategy::baseline(0, 5);
        let next = base.mutate(
            &[
                Hypothesis::new(PromptDimension::Verbosity, "too terse", "explain more"),
                Hypothesis::new(PromptDimension::InstructionOrder, "lost context", "context first"),
                Hypothesis::new(PromptDimension::Scope, "wandered", "only touch src/parser"),
            ],
            5,
        );
        assert_eq!(next.approach, 0);
        assert_eq!(next.verbosity, Verbosity::Detailed);
        assert_eq!(next.order, InstructionOrder::ContextFirst);
        assert_eq!(next.guidance, vec!["only touch src/parser".to_string()]);
        assert_eq!(next.learnings.len(), 3);
    }

    #[test]
    fn test_mutation_does_not_duplicate_guidance() {
        let h = Hypothesis::new(PromptDimension::Testing, "same", "run tests");
        let once = PromptStrategy::baseline(0, 5).mutate(&[h.clone()], 5);
        let twice = once.mutate(&[h], 5);
        assert_eq!(twice.guidance.len(), 1);
        assert_eq!(twice.learnings.len(), 1);
    }

    #[test]
    fn test_render_respects_order() {
        let mut strategy = PromptStrategy::baseline(0, 5);
        let task_first = strategy.render("Fix the bug", "Be careful");
        assert!(task_first.starts_with("Fix the bug"));

        strategy.order = InstructionOrder::ContextFirst;
        let context_first = strategy.render("Fix the bug", "Be careful");
        assert!(context_first.starts_with("Approach: Be careful"));
        assert!(context_first.ends_with("Task:\nFix the bug"));
    }
}
