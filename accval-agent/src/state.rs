//! The attempt state machine.
//!
//! ```text
//! GENERATING -> EXTRACTING -> COMPILING_RUNNING -+-> ACCEPTED
//!      ^                                         +-> EXHAUSTED
//!      +------------------ RETRYING <------------+
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    Generating,
    Extracting,
    CompilingRunning,
    Retrying,
    Accepted,
    Exhausted,
}

/// What just happened in the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    /// The completion service returned text
    Completed,
    /// Code (possibly empty) was extracted and written out
    Extracted,
    /// The harness finished
    Executed { passed: bool },
    /// Feedback was attached for the next attempt
    Resumed,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Accepted | LoopState::Exhausted)
    }

    /// The state after `event`, or `None` if `event` cannot happen here.
    ///
    /// `attempt` is zero-based; a failure at `attempt == max_retries` exhausts.
    pub fn next(self, event: LoopEvent, attempt: usize, max_retries: usize) -> Option<LoopState> {
        use LoopState::*;
        match (self, event) {
            (Generating, LoopEvent::Completed) => Some(Extracting),
            (Extracting, LoopEvent::Extracted) => Some(CompilingRunning),
            (CompilingRunning, LoopEvent::Executed { passed: true }) => Some(Accepted),
            (CompilingRunning, LoopEvent::Executed { passed: false }) if attempt < max_retries => Some(Retrying),
            (CompilingRunning, LoopEvent::Executed { passed: false }) => Some(Exhausted),
            (Retrying, LoopEvent::Resumed) => Some(Generating),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Generating => "GENERATING",
            LoopState::Extracting => "EXTRACTING",
            LoopState::CompilingRunning => "COMPILING_RUNNING",
            LoopState::Retrying => "RETRYING",
            LoopState::Accepted => "ACCEPTED",
            LoopState::Exhausted => "EXHAUSTED",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let s = LoopState::Generating;
        let s = s.next(LoopEvent::Completed, 0, 3).unwrap();
        assert_eq!(s, LoopState::Extracting);
        let s = s.next(LoopEvent::Extracted, 0, 3).unwrap();
        assert_eq!(s, LoopState::CompilingRunning);
        let s = s.next(LoopEvent::Executed { passed: true }, 0, 3).unwrap();
        assert_eq!(s, LoopState::Accepted);
        assert!(s.is_terminal());
    }

    #[test]
    fn test_retry_bound() {
        let failed = LoopEvent::Executed { passed: false };
        assert_eq!(LoopState::CompilingRunning.next(failed, 0, 3), Some(LoopState::Retrying));
        assert_eq!(LoopState::CompilingRunning.next(failed, 2, 3), Some(LoopState::Retrying));
        assert_eq!(LoopState::CompilingRunning.next(failed, 3, 3), Some(LoopState::Exhausted));
        assert_eq!(LoopState::CompilingRunning.next(failed, 0, 0), Some(LoopState::Exhausted));
        assert_eq!(LoopState::Retrying.next(LoopEvent::Resumed, 1, 3), Some(LoopState::Generating));
    }

    #[test]
    fn test_success_at_last_attempt_is_accepted() {
        let passed = LoopEvent::Executed { passed: true };
        assert_eq!(LoopState::CompilingRunning.next(passed, 3, 3), Some(LoopState::Accepted));
    }

    #[test]
    fn test_invalid_events() {
        assert_eq!(LoopState::Generating.next(LoopEvent::Extracted, 0, 3), None);
        assert_eq!(LoopState::Accepted.next(LoopEvent::Resumed, 0, 3), None);
        assert_eq!(LoopState::Exhausted.next(LoopEvent::Completed, 0, 3), None);
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(serde_json::to_value(LoopState::CompilingRunning).unwrap(), "COMPILING_RUNNING");
        assert_eq!(LoopState::Exhausted.to_string(), "EXHAUSTED");
    }
}
