//! Orchestrator - drives the generate/extract/compile-run loop for one
//! feature at a time.
//!
//! The completion service, the harness, and the retrieval index are all
//! injected, so the loop runs the same against stubs as against a real
//! deployment.

use crate::config::GeneratorConfig;
use crate::evaluator::Evaluator;
use crate::observer::AttemptObserver;
use crate::state::{LoopEvent, LoopState};
use accval_core::{
    extract, extract_primed, persist, AttemptRecord, ChatMessage, CompletionRequest, ContextIndex, Embedder,
    Error, ErrorKind, ExecutionResult, FeatureRequest, FinishReason, GeneratedArtifact, Harness, LlmProvider,
    PromptState, ProviderError, Result, RetrievedContext, SourceLanguage, UsageTracker,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Turns a source file into an [`ExecutionResult`].
///
/// `Err` is reserved for conditions that must abort the run.
#[allow(async_fn_in_trait)]
pub trait Validator {
    async fn validate(&self, source: &Path) -> Result<ExecutionResult>;
}

impl Validator for Harness {
    async fn validate(&self, source: &Path) -> Result<ExecutionResult> {
        self.run(source).await
    }
}

/// Everything one run produced, in attempt order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub feature: FeatureRequest,
    pub context: RetrievedContext,
    pub records: Vec<AttemptRecord>,
    pub final_state: LoopState,
}

impl RunOutcome {
    pub fn accepted(&self) -> bool {
        self.final_state == LoopState::Accepted
    }

    pub fn attempts(&self) -> usize {
        self.records.len()
    }

    pub fn accepted_record(&self) -> Option<&AttemptRecord> {
        if self.accepted() {
            self.records.last()
        } else {
            None
        }
    }
}

/// The feedback loop
pub struct Orchestrator<P: LlmProvider, V: Validator, E: Embedder> {
    provider: P,
    validator: V,
    index: ContextIndex<E>,
    evaluator: Evaluator,
    language: SourceLanguage,
    usage: UsageTracker,
    config: GeneratorConfig,
}

impl<P: LlmProvider, V: Validator, E: Embedder> Orchestrator<P, V, E> {
    /// Fails if the configuration is invalid, before any service is called
    pub fn new(provider: P, validator: V, index: ContextIndex<E>, config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let language = config.language()?;
        Ok(Self {
            provider,
            validator,
            index,
            evaluator: Evaluator::new(config.evaluation.clone()),
            language,
            usage: UsageTracker::new(),
            config,
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn validator(&self) -> &V {
        &self.validator
    }

    pub fn index(&self) -> &ContextIndex<E> {
        &self.index
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Token usage across every run so far
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Run the loop for one feature until it is accepted or exhausted.
    ///
    /// Returns `Err` only for fatal conditions: retrieval failure, an
    /// unsupported source type, or a completion service that stays down.
    pub async fn run(&mut self, feature: &FeatureRequest, observer: &mut dyn AttemptObserver) -> Result<RunOutcome> {
        let context = self
            .index
            .query(feature.as_str(), self.config.top_k_passages)
            .await
            .map_err(|e| e.with_operation("orchestrator::run").with_context("feature", feature.as_str()))?;
        observer.on_context(feature, &context);

        let context_text = context.joined();
        let mut prompt = PromptState::new(feature.as_str(), context_text.clone(), self.language)
            .with_prime_fence(self.config.prime_fence);

        info!(
            feature = %feature,
            passages = context.len(),
            max_retries = self.config.max_retries,
            "starting run"
        );

        let mut records: Vec<AttemptRecord> = Vec::new();
        let mut state = LoopState::Generating;
        let mut attempt = 0;
        let mut completion = String::new();
        let mut pending: Option<(GeneratedArtifact, Result<()>)> = None;

        while !state.is_terminal() {
            let event = match state {
                LoopState::Generating => {
                    let rendered = prompt.render();
                    observer.on_prompt(attempt, &rendered);
                    completion = self
                        .complete(&rendered)
                        .await
                        .map_err(|e| e.with_context("attempt", attempt.to_string()))?;
                    LoopEvent::Completed
                }
                LoopState::Extracting => {
                    let artifact = self.extract_artifact(attempt, &completion)?;
                    observer.on_artifact(&artifact);
                    let written = persist(&artifact.code, &self.config.source_path).await;
                    pending = Some((artifact, written));
                    LoopEvent::Extracted
                }
                LoopState::CompilingRunning => {
                    let (artifact, written) = pending.take().ok_or_else(|| {
                        Error::unexpected("no extracted artifact to validate").with_operation("orchestrator::run")
                    })?;
                    let result = match written {
                        Ok(()) => self.validator.validate(&self.config.source_path).await?,
                        Err(e) => {
                            warn!(error = %e, "could not write source file");
                            ExecutionResult::fault(format!("An error occurred: {}", e.message()))
                        }
                    };
                    info!(attempt, exit_code = result.exit_code, "attempt finished");
                    observer.on_result(attempt, &result);

                    let mut record = AttemptRecord::new(artifact, result);
                    if self.config.evaluate {
                        record.evaluation = self
                            .evaluator
                            .evaluate(
                                &self.provider,
                                &mut self.usage,
                                feature.as_str(),
                                &context_text,
                                &record.artifact.code,
                                &record.result,
                            )
                            .await;
                        if let Some(verdict) = &record.evaluation {
                            observer.on_evaluation(attempt, verdict);
                        }
                    }

                    let passed = record.passed();
                    records.push(record);
                    LoopEvent::Executed { passed }
                }
                LoopState::Retrying => {
                    if let Some(last) = records.last() {
                        prompt.record_failure(&last.artifact, &last.result);
                    }
                    attempt += 1;
                    LoopEvent::Resumed
                }
                LoopState::Accepted | LoopState::Exhausted => break,
            };

            let next = state.next(event, attempt, self.config.max_retries).ok_or_else(|| {
                Error::unexpected(format!("no transition from {} on {:?}", state, event))
                    .with_operation("orchestrator::run")
            })?;
            debug!(attempt, from = %state, to = %next, "transition");
            observer.on_transition(attempt, state, next);
            state = next;
        }

        if state == LoopState::Accepted {
            info!(feature = %feature, attempts = records.len(), "test accepted");
        } else {
            warn!(feature = %feature, attempts = records.len(), "attempts exhausted");
        }

        Ok(RunOutcome {
            feature: feature.clone(),
            context,
            records,
            final_state: state,
        })
    }

    /// NotFound becomes an empty artifact so it still reaches the harness
    fn extract_artifact(&self, attempt: usize, raw: &str) -> Result<GeneratedArtifact> {
        let extracted = if self.config.prime_fence {
            extract_primed(raw)
        } else {
            extract(raw)
        };
        match extracted {
            Ok(code) => Ok(GeneratedArtifact::new(attempt, code)),
            Err(e) if e.kind() == ErrorKind::ExtractionNotFound => {
                info!(attempt, "no code block in completion");
                Ok(GeneratedArtifact::not_found(attempt))
            }
            Err(e) => Err(e),
        }
    }

    /// Ask for a test, retrying transient failures with linear back-off
    async fn complete(&mut self, prompt: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if !self.config.system_prompt.is_empty() {
            messages.push(ChatMessage::system(self.config.system_prompt.clone()));
        }
        messages.push(ChatMessage::user(prompt));

        let mut retries = 0;
        loop {
            let request = CompletionRequest::new(messages.clone()).with_params(self.config.generation.clone());
            let err = match self.provider.complete(request).await {
                Ok(response) => {
                    self.usage.track(&response.usage);
                    if response.finish_reason == FinishReason::Length {
                        // an unterminated fence here shows up as a missing code block
                        warn!(
                            max_tokens = ?self.config.generation.max_tokens,
                            "completion truncated at the token limit"
                        );
                    }
                    match response.content {
                        Some(text) => {
                            debug!(model = %response.model, id = %response.id, chars = text.len(), "completion received");
                            return Ok(text);
                        }
                        None => Error::from(ProviderError::EmptyResponse),
                    }
                }
                Err(e) => Error::from(e),
            };
            let err = err.with_operation("orchestrator::generate");

            if !err.is_retryable() {
                return Err(err);
            }
            if retries >= self.config.completion_retries {
                return Err(err.persist().with_context("retries", retries.to_string()));
            }
            retries += 1;
            let delay = Duration::from_millis(self.config.retry_backoff_ms.saturating_mul(retries as u64));
            warn!(error = %err, retry = retries, delay_ms = delay.as_millis() as u64, "completion failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}
