//! Console rendering of loop progress

use accval_agent::{AttemptObserver, LoopState, RunOutcome};
use accval_core::{ExecutionResult, FeatureRequest, GeneratedArtifact, RetrievedContext, UsageTracker};

/// Prints each attempt as it happens
pub struct ConsoleObserver {
    quiet: bool,
    verbose: bool,
    max_attempts: usize,
}

impl ConsoleObserver {
    pub fn new(quiet: bool, verbose: bool, max_retries: usize) -> Self {
        Self {
            quiet,
            verbose,
            max_attempts: max_retries + 1,
        }
    }

    pub fn summary(&self, outcome: &RunOutcome) {
        match outcome.accepted_record() {
            Some(record) => {
                println!("\nTest passed on attempt {} of {}.", record.attempt + 1, self.max_attempts);
                if self.quiet {
                    println!("{}", record.artifact.code);
                }
            }
            None => println!(
                "\nNo passing test after {} attempts for: {}",
                outcome.attempts(),
                outcome.feature
            ),
        }
    }

}

/// Token totals for the whole invocation
pub fn usage_line(usage: &UsageTracker) -> Option<String> {
    if usage.total_calls == 0 {
        return None;
    }
    Some(format!(
        "Completion calls: {} ({} tokens: {} prompt + {} completion)",
        usage.total_calls,
        usage.total_tokens(),
        usage.total_prompt_tokens,
        usage.total_completion_tokens
    ))
}

fn section(title: &str, body: &str) {
    println!("--- {} ---", title);
    if body.is_empty() {
        println!("(empty)");
    } else {
        println!("{}", body);
    }
}

impl AttemptObserver for ConsoleObserver {
    fn on_context(&mut self, _feature: &FeatureRequest, context: &RetrievedContext) {
        if self.verbose {
            section("Retrieved Context from Spec", &context.joined());
        }
    }

    fn on_transition(&mut self, _attempt: usize, _from: LoopState, to: LoopState) {
        if to == LoopState::Retrying && !self.quiet {
            println!("Retrying with additional context based on previous outputs...");
        }
    }

    fn on_prompt(&mut self, attempt: usize, prompt: &str) {
        if !self.quiet {
            println!("\nAttempt {} of {} to generate and run test...", attempt + 1, self.max_attempts);
        }
        if self.verbose {
            section("Prompt", prompt);
        }
    }

    fn on_artifact(&mut self, artifact: &GeneratedArtifact) {
        if self.quiet {
            return;
        }
        if artifact.found {
            section("Generated Test", &artifact.code);
        } else {
            println!("No code block found in the response.");
        }
    }

    fn on_result(&mut self, _attempt: usize, result: &ExecutionResult) {
        if self.quiet {
            return;
        }
        section("Compiler Output", &result.compiler_output);
        section("Runtime Output", &result.runtime_output);
        if result.passed() {
            println!("Test passed.");
        } else {
            println!("Test failed (exit code {}).", result.exit_code);
        }
    }

    fn on_evaluation(&mut self, _attempt: usize, evaluation: &str) {
        if !self.quiet {
            section("LLM Evaluation", evaluation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accval_core::Usage;

    #[test]
    fn test_usage_line() {
        let mut usage = UsageTracker::new();
        assert_eq!(usage_line(&usage), None);

        usage.track(&Usage {
            prompt_tokens: 120,
            completion_tokens: 30,
            total_tokens: 150,
        });
        usage.track(&Usage {
            prompt_tokens: 80,
            completion_tokens: 20,
            total_tokens: 100,
        });
        assert_eq!(
            usage_line(&usage).as_deref(),
            Some("Completion calls: 2 (250 tokens: 200 prompt + 50 completion)")
        );
    }
}
