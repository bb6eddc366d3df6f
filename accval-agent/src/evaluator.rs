//! Optional model-as-judge verdict on an attempt. Purely observational: a
//! failed evaluation is logged and dropped.

use accval_core::{
    evaluation_prompt, ChatMessage, CompletionRequest, Error, ExecutionResult, LlmProvider, SamplingParams,
    UsageTracker,
};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Evaluator {
    params: SamplingParams,
}

impl Evaluator {
    pub fn new(params: SamplingParams) -> Self {
        Self { params }
    }

    /// One-sentence verdict, or `None` if the service failed or said nothing
    pub async fn evaluate<P: LlmProvider>(
        &self,
        provider: &P,
        usage: &mut UsageTracker,
        feature: &str,
        context: &str,
        code: &str,
        result: &ExecutionResult,
    ) -> Option<String> {
        let prompt = evaluation_prompt(feature, context, code, result);
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)]).with_params(self.params.clone());

        match provider.complete(request).await {
            Ok(response) => {
                usage.track(&response.usage);
                let verdict = response.content.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
                debug!(has_verdict = verdict.is_some(), "evaluation finished");
                verdict
            }
            Err(e) => {
                let e = Error::from(e).with_operation("evaluator::evaluate");
                warn!(error = %e, "evaluation failed");
                None
            }
        }
    }
}
