//! Prompt construction for the generate-validate loop.
//!
//! A [`PromptState`] starts from the feature and its retrieved context and
//! carries, after a failed attempt, that attempt's code and diagnostics.

use crate::extract::FENCE;
use crate::harness::SourceLanguage;
use crate::record::{ExecutionResult, GeneratedArtifact};
use serde::{Deserialize, Serialize};

/// The failed attempt a retry should correct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub attempt: usize,
    pub code: String,
    pub compiler_output: String,
    pub runtime_output: String,
}

impl Feedback {
    pub fn from_attempt(artifact: &GeneratedArtifact, result: &ExecutionResult) -> Self {
        Self {
            attempt: artifact.attempt,
            code: artifact.code.clone(),
            compiler_output: result.compiler_output.clone(),
            runtime_output: result.runtime_output.clone(),
        }
    }
}

/// The instruction sent to the completion service for one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptState {
    pub feature: String,
    pub context: String,
    pub language: SourceLanguage,
    /// End the prompt with an opening fence so the answer starts as code
    pub prime_fence: bool,
    /// Only the immediately prior failure; replaced on every retry
    pub feedback: Option<Feedback>,
}

impl PromptState {
    pub fn new(feature: impl Into<String>, context: impl Into<String>, language: SourceLanguage) -> Self {
        Self {
            feature: feature.into(),
            context: context.into(),
            language,
            prime_fence: true,
            feedback: None,
        }
    }

    pub fn with_prime_fence(mut self, prime_fence: bool) -> Self {
        self.prime_fence = prime_fence;
        self
    }

    /// Replace the corrective context with the attempt that just failed
    pub fn record_failure(&mut self, artifact: &GeneratedArtifact, result: &ExecutionResult) {
        self.feedback = Some(Feedback::from_attempt(artifact, result));
    }

    pub fn render(&self) -> String {
        let mut prompt = format!(
            "Use the following context from the specification to create an OpenACC compiler \
             validation test in {}. Return 0 if the feature works, 1 otherwise.\n\n\
             Context:\n{}\n\n\
             Feature: {}\n\n",
            self.language.display_name(),
            self.context,
            self.feature
        );

        if let Some(feedback) = &self.feedback {
            prompt.push_str(&format!("Previous Code Attempt:\n{}\n\n", feedback.code));
            prompt.push_str(&format!("Previous Compiler Output:\n{}\n\n", feedback.compiler_output));
            if !feedback.runtime_output.is_empty() {
                prompt.push_str(&format!("Previous Runtime Output:\n{}\n\n", feedback.runtime_output));
            }
        }

        if self.prime_fence {
            prompt.push_str(FENCE);
        }
        prompt
    }
}

/// Prompt asking for a one-sentence verdict on an attempt
pub fn evaluation_prompt(feature: &str, context: &str, code: &str, result: &ExecutionResult) -> String {
    format!(
        "Evaluate the following test for the feature '{}'.\n\n\
         Context:\n{}\n\n\
         Generated Code:\n{}\n\n\
         Compiler Output:\n{}\n\n\
         Runtime Output:\n{}\n\n\
         Is this a good test? Provide a one-sentence evaluation.",
        feature, context, code, result.compiler_output, result.runtime_output
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> PromptState {
        PromptState::new("acc parallel loop reduction", "2.5.1 Parallel Construct ...", SourceLanguage::C)
    }

    #[test]
    fn test_initial_prompt() {
        let prompt = state().render();
        assert!(prompt.starts_with("Use the following context"));
        assert!(prompt.contains("validation test in C."));
        assert!(prompt.contains("Context:\n2.5.1 Parallel Construct ...\n\n"));
        assert!(prompt.contains("Feature: acc parallel loop reduction\n\n"));
        assert!(!prompt.contains("Previous"));
        assert!(prompt.ends_with(FENCE));
    }

    #[test]
    fn test_unprimed_prompt() {
        let prompt = state().with_prime_fence(false).render();
        assert!(prompt.ends_with("\n\n"));
        assert!(!prompt.contains(FENCE));
    }

    #[test]
    fn test_feedback_carries_code_and_diagnostics() {
        let mut state = state();
        let artifact = GeneratedArtifact::new(0, "int main() { return 1; }");
        let result = ExecutionResult::ran(1, "main: 5, Generating Tesla code", "reduction mismatch");
        state.record_failure(&artifact, &result);

        let prompt = state.render();
        assert!(prompt.contains("Previous Code Attempt:\nint main() { return 1; }\n\n"));
        assert!(prompt.contains("Previous Compiler Output:\nmain: 5, Generating Tesla code\n\n"));
        assert!(prompt.contains("Previous Runtime Output:\nreduction mismatch\n\n"));
    }

    #[test]
    fn test_feedback_is_replaced_not_accumulated() {
        let mut state = state();
        state.record_failure(
            &GeneratedArtifact::new(0, "FIRST"),
            &ExecutionResult::compile_failed(2, "first error"),
        );
        state.record_failure(
            &GeneratedArtifact::new(1, "SECOND"),
            &ExecutionResult::compile_failed(2, "second error"),
        );

        let prompt = state.render();
        assert!(prompt.contains("SECOND"));
        assert!(!prompt.contains("FIRST"));
        assert!(!prompt.contains("Previous Runtime Output"));
    }

    #[test]
    fn test_language_in_prompt() {
        let prompt = PromptState::new("f", "c", SourceLanguage::Fortran).render();
        assert!(prompt.contains("validation test in Fortran."));
    }

    #[test]
    fn test_evaluation_prompt() {
        let result = ExecutionResult::ran(0, "notes", "OK");
        let prompt = evaluation_prompt("acc data", "ctx", "int main(){}", &result);
        assert!(prompt.starts_with("Evaluate the following test for the feature 'acc data'."));
        assert!(prompt.contains("Runtime Output:\nOK\n\n"));
        assert!(prompt.ends_with("Provide a one-sentence evaluation."));
    }
}
