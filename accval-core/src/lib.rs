//! # accval core
//!
//! Building blocks for generating directive-based accelerator (OpenACC)
//! conformance tests with a language model.
//!
//! ## Core Concepts
//! - **Retriever**: narrows the reference specification to a few passages
//! - **Provider**: trait-based access to an OpenAI-compatible completion service
//! - **Prompt**: the instruction for one attempt, with the prior failure attached
//! - **Extract**: pulls the last fenced code region out of a completion
//! - **Harness**: compiles and runs the extracted test, reporting exit status and diagnostics

pub mod error;
pub mod extract;
pub mod harness;
pub mod input;
pub mod prompt;
pub mod provider;
pub mod record;
pub mod retriever;

pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use extract::{extract, extract_primed, persist, FENCE};
pub use harness::{Harness, SourceLanguage, ToolchainConfig};
pub use input::{read_instructions, FeatureRequest};
pub use prompt::{evaluation_prompt, Feedback, PromptState};
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, OpenAIProvider,
    ProviderConfig, ProviderError, Role, SamplingParams, Usage, UsageTracker,
};
pub use record::{AttemptRecord, ExecutionResult, GeneratedArtifact, Stage};
pub use retriever::{
    ContextIndex, Embedder, Embedding, EmbeddingConfig, Passage, RemoteEmbedder, RetrievedContext, SplitterConfig,
    TextSplitter, TfIdfEmbedder, DEFAULT_TOP_K,
};
