//! # accval agent
//!
//! The feedback loop that turns a feature description into a passing test:
//! 1. Retrieve the specification passages closest to the feature
//! 2. Ask the completion service for a test
//! 3. Extract the code and write it to the source file
//! 4. Compile and run it
//! 5. On failure, attach the code and diagnostics to the prompt and try again
//! 6. Stop when a test passes or the attempt bound is reached
//!
//! Each attempt may also be judged by the completion service; that verdict
//! is recorded but never changes the outcome.

mod config;
mod evaluator;
mod observer;
mod orchestrator;
mod state;

pub use config::{GeneratorConfig, DEFAULT_SYSTEM_PROMPT};
pub use evaluator::Evaluator;
pub use observer::{AttemptObserver, NoopObserver};
pub use orchestrator::{Orchestrator, RunOutcome, Validator};
pub use state::{LoopEvent, LoopState};
