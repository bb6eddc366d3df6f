//! Per-attempt data: the extracted artifact, the harness verdict, and the
//! record tying them to an attempt index.

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// Exit code reported when the process machinery itself faults
pub const FAULT_EXIT_CODE: i32 = 1;

/// Exit code reported when a compile or run step exceeds its time budget
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// The last step the harness reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Stopped at (or before) compilation; the binary never ran
    #[default]
    Compile,
    /// The binary was executed
    Run,
}

/// Outcome of compiling and running one source file.
///
/// `exit_code == 0` is the only success predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub compiler_output: String,
    pub runtime_output: String,
    #[serde(default)]
    pub stage: Stage,
}

impl ExecutionResult {
    /// Compiler exited nonzero (or timed out); the binary was not run
    pub fn compile_failed(exit_code: i32, compiler_output: impl Into<String>) -> Self {
        Self {
            exit_code,
            compiler_output: compiler_output.into(),
            runtime_output: String::new(),
            stage: Stage::Compile,
        }
    }

    /// The binary ran, whatever its exit status
    pub fn ran(exit_code: i32, compiler_output: impl Into<String>, runtime_output: impl Into<String>) -> Self {
        Self {
            exit_code,
            compiler_output: compiler_output.into(),
            runtime_output: runtime_output.into(),
            stage: Stage::Run,
        }
    }

    /// Synthetic compile-failure-shaped result for a process fault
    pub fn fault(description: impl Into<String>) -> Self {
        Self::compile_failed(FAULT_EXIT_CODE, description)
    }

    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// `CompileFailure` or `RuntimeFailure` for a failed result, `None` on success
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        if self.passed() {
            return None;
        }
        Some(match self.stage {
            Stage::Compile => ErrorKind::CompileFailure,
            Stage::Run => ErrorKind::RuntimeFailure,
        })
    }
}

/// Source code extracted from one completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub attempt: usize,
    /// Empty when no fenced region was found
    pub code: String,
    /// False when extraction found nothing
    pub found: bool,
}

impl GeneratedArtifact {
    pub fn new(attempt: usize, code: impl Into<String>) -> Self {
        Self {
            attempt,
            code: code.into(),
            found: true,
        }
    }

    pub fn not_found(attempt: usize) -> Self {
        Self {
            attempt,
            code: String::new(),
            found: false,
        }
    }
}

/// One generate-validate cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: usize,
    pub artifact: GeneratedArtifact,
    pub result: ExecutionResult,
    /// Free-text verdict from the evaluator, when one ran and answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<String>,
}

impl AttemptRecord {
    pub fn new(artifact: GeneratedArtifact, result: ExecutionResult) -> Self {
        Self {
            attempt: artifact.attempt,
            artifact,
            result,
            evaluation: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.result.passed()
    }
}
