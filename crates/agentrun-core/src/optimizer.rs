//! Instruction optimizer seam.
//!
//! Given the instructions an agent ran with, the result it produced and a
//! plain-language criterion it should have met, an [`InstructionOptimizer`]
//! suggests replacement instructions. The aggregation core never depends on
//! a text-generation backend; [`PromptOptimizer`] takes one through the
//! [`TextGenerator`] trait.

use agentrun_proto::RunResult;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

/// Characters of the final response included in the analysis prompt.
const RESPONSE_EXCERPT_CHARS: usize = 1500;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").expect("fenced block pattern is valid")
});

/// A suggested instruction rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionSuggestion {
    /// The improved instruction text.
    pub instruction: String,
    /// Why the change should close the gap.
    pub reasoning: String,
    /// One-sentence summary of what changed.
    pub changes: String,
}

impl fmt::Display for InstructionSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Suggested instruction:\n\n  {}\n\n  Changes: {}\n  Reasoning: {}",
            self.instruction, self.changes, self.reasoning
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OptimizerError {
    #[error(transparent)]
    Generator(#[from] anyhow::Error),

    #[error("Could not parse optimizer output: {0}")]
    Parse(String),
}

/// Suggests better instructions from an observed run.
#[async_trait]
pub trait InstructionOptimizer: Send + Sync {
    async fn suggest(
        &self,
        instructions: &str,
        result: &RunResult,
        criterion: &str,
    ) -> Result<InstructionSuggestion, OptimizerError>;
}

/// A text-generation backend: prompt in, completion out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Optimizer that asks a [`TextGenerator`] for a JSON suggestion.
pub struct PromptOptimizer<G> {
    generator: G,
}

impl<G: TextGenerator> PromptOptimizer<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// Builds the analysis prompt sent to the generator.
    pub fn build_prompt(instructions: &str, result: &RunResult, criterion: &str) -> String {
        let instructions = if instructions.trim().is_empty() {
            "(no instruction)"
        } else {
            instructions
        };
        let response: String = result
            .final_response()
            .unwrap_or("(no response)")
            .chars()
            .take(RESPONSE_EXCERPT_CHARS)
            .collect();
        let names = result.tool_names_called();
        let tools = if names.is_empty() {
            "none".to_string()
        } else {
            names.into_iter().collect::<Vec<_>>().join(", ")
        };

        format!(
            "You are helping improve a coding agent instruction.

## Current instruction
{instructions}

## What actually happened
The agent produced:
{response}

Tools called: {tools}
Run succeeded: {success}

## Expected criterion
The agent SHOULD have satisfied this criterion:
{criterion}

Analyze the gap between the instruction and the observed behaviour.
Suggest a specific, concise, directive improvement to the instruction
that would make the agent satisfy the criterion.
Keep the instruction under 200 words. Do not add unrelated rules.

Answer with a single JSON object with string fields \"instruction\",
\"reasoning\" and \"changes\".",
            success = result.success,
        )
    }
}

#[async_trait]
impl<G: TextGenerator> InstructionOptimizer for PromptOptimizer<G> {
    async fn suggest(
        &self,
        instructions: &str,
        result: &RunResult,
        criterion: &str,
    ) -> Result<InstructionSuggestion, OptimizerError> {
        let prompt = Self::build_prompt(instructions, result, criterion);
        let output = self.generator.generate(&prompt).await?;
        debug!(output_len = output.len(), "Optimizer generator responded");
        parse_suggestion(&output)
    }
}

/// Parses a suggestion from generator output, bare or inside a fenced block.
pub fn parse_suggestion(output: &str) -> Result<InstructionSuggestion, OptimizerError> {
    let body = FENCED_BLOCK
        .captures(output)
        .and_then(|c| c.get(1))
        .map_or(output.trim(), |m| m.as_str());
    serde_json::from_str(body).map_err(|e| OptimizerError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_proto::{Role, Turn};

    struct Canned(&'static str);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl TextGenerator for Failing {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("backend unavailable")
        }
    }

    fn result() -> RunResult {
        RunResult {
            success: true,
            turns: vec![Turn::new(Role::Assistant, "def add(a, b): return a + b")],
            ..RunResult::default()
        }
    }

    #[test]
    fn test_prompt_contents() {
        let prompt =
            PromptOptimizer::<Canned>::build_prompt("", &result(), "Always write docstrings");
        assert!(prompt.contains("(no instruction)"));
        assert!(prompt.contains("def add(a, b)"));
        assert!(prompt.contains("Tools called: none"));
        assert!(prompt.contains("Run succeeded: true"));
        assert!(prompt.contains("Always write docstrings"));
    }

    #[test]
    fn test_prompt_truncates_response() {
        let long = RunResult {
            turns: vec![Turn::new(Role::Assistant, "x".repeat(5000))],
            ..RunResult::default()
        };
        let prompt = PromptOptimizer::<Canned>::build_prompt("Be brief.", &long, "c");
        assert!(prompt.contains(&"x".repeat(RESPONSE_EXCERPT_CHARS)));
        assert!(!prompt.contains(&"x".repeat(RESPONSE_EXCERPT_CHARS + 1)));
    }

    #[test]
    fn test_fenced_block_pattern_compiles() {
        let captures = FENCED_BLOCK.captures("```\n{\"a\": 1}\n```").unwrap();
        assert_eq!(&captures[1], "{\"a\": 1}");
    }

    #[test]
    fn test_parse_bare_and_fenced() {
        let bare = r#"{"instruction":"Add docstrings.","reasoning":"Missing.","changes":"Added rule."}"#;
        assert_eq!(parse_suggestion(bare).unwrap().instruction, "Add docstrings.");

        let fenced = format!("Here you go:\n```json\n{}\n```\n", bare);
        assert_eq!(parse_suggestion(&fenced).unwrap().changes, "Added rule.");

        assert!(matches!(
            parse_suggestion("no json here"),
            Err(OptimizerError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_suggest_end_to_end() {
        let optimizer = PromptOptimizer::new(Canned(
            r#"{"instruction":"Write docstrings for every function.","reasoning":"The agent skipped them.","changes":"Made docstrings mandatory."}"#,
        ));
        let suggestion = optimizer
            .suggest("Write Python.", &result(), "Always write docstrings")
            .await
            .unwrap();
        let text = suggestion.to_string();
        assert!(text.contains("Write docstrings for every function."));
        assert!(text.contains("Changes: Made docstrings mandatory."));
        assert!(text.contains("Reasoning: The agent skipped them."));
    }

    #[tokio::test]
    async fn test_generator_error_propagates() {
        let optimizer = PromptOptimizer::new(Failing);
        let err = optimizer.suggest("", &result(), "c").await.unwrap_err();
        assert!(matches!(err, OptimizerError::Generator(_)));
        assert_eq!(err.to_string(), "backend unavailable");
    }
}
