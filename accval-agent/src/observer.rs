//! Progress sink for the loop. The orchestrator reports to it after every
//! step; rendering is the observer's business.

use crate::state::LoopState;
use accval_core::{ExecutionResult, FeatureRequest, GeneratedArtifact, RetrievedContext};

/// Receives loop progress. Every method defaults to a no-op.
pub trait AttemptObserver {
    fn on_context(&mut self, _feature: &FeatureRequest, _context: &RetrievedContext) {}

    fn on_transition(&mut self, _attempt: usize, _from: LoopState, _to: LoopState) {}

    fn on_prompt(&mut self, _attempt: usize, _prompt: &str) {}

    fn on_artifact(&mut self, _artifact: &GeneratedArtifact) {}

    fn on_result(&mut self, _attempt: usize, _result: &ExecutionResult) {}

    fn on_evaluation(&mut self, _attempt: usize, _evaluation: &str) {}
}

/// Ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl AttemptObserver for NoopObserver {}
