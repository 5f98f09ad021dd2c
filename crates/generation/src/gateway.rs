use crate::attribute::ControlAttribute;
use crate::backend::{
    ChatMessage, CompletionBackend, CompletionRequest, OpenAiBackend, OpenAiConfig, SamplingParams,
};
use crate::error::Result;
use crate::prompts::{PromptAssembler, CLASSIFY_SYSTEM, GENERATE_SYSTEM};
use crate::retry::RetryPolicy;
use rand::Rng;
use reframe_vector_store::RetrievalResult;
use std::sync::Arc;

/// The single seam to the external generation service.
///
/// Failures are returned as typed errors after the retry policy is exhausted;
/// nothing is replaced by a placeholder string.
#[derive(Clone)]
pub struct GenerationGateway {
    backend: Arc<dyn CompletionBackend>,
    retry: RetryPolicy,
}

impl GenerationGateway {
    pub fn new(backend: Arc<dyn CompletionBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    pub fn openai(config: OpenAiConfig, retry: RetryPolicy) -> Result<Self> {
        log::info!("Generation backend: {} at {}", config.model, config.api_base);
        Ok(Self::new(Arc::new(OpenAiBackend::new(config)?), retry))
    }

    /// Thinking-trap label as returned by the service; not parsed.
    pub async fn classify(&self, thought: &str, situation: &str) -> Result<String> {
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(CLASSIFY_SYSTEM),
                ChatMessage::user(PromptAssembler::classify(thought, situation)),
            ],
            sampling: SamplingParams::CLASSIFY,
        };
        self.complete("classify", &request).await
    }

    /// One reframe candidate grounded on `retrieval`.
    ///
    /// The examples are re-shuffled with `rng`, independently of the order the
    /// retrieval already carries.
    pub async fn generate<R: Rng + ?Sized>(
        &self,
        thought: &str,
        situation: &str,
        retrieval: &RetrievalResult,
        rng: &mut R,
    ) -> Result<String> {
        let prompt = PromptAssembler::generate(thought, situation, retrieval.entries(), rng);
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(GENERATE_SYSTEM),
                ChatMessage::user(prompt),
            ],
            sampling: SamplingParams::GENERATE,
        };
        self.complete("generate", &request).await
    }

    /// Rewrites `reframe` toward `attribute`. Unknown names fail before any service call.
    pub async fn rewrite(
        &self,
        attribute: &str,
        reframe: &str,
        thought: &str,
        situation: &str,
    ) -> Result<String> {
        let attribute: ControlAttribute = attribute.parse()?;
        self.rewrite_as(attribute, reframe, thought, situation).await
    }

    pub async fn rewrite_as(
        &self,
        attribute: ControlAttribute,
        reframe: &str,
        thought: &str,
        situation: &str,
    ) -> Result<String> {
        let request = CompletionRequest {
            messages: vec![ChatMessage::user(PromptAssembler::rewrite(
                attribute, reframe, thought, situation,
            ))],
            sampling: SamplingParams::GENERATE,
        };
        self.complete(attribute.as_str(), &request).await
    }

    async fn complete(&self, label: &str, request: &CompletionRequest) -> Result<String> {
        let text = self
            .retry
            .run(label, || self.backend.complete(request))
            .await?;
        log::debug!("{label}: received {} chars", text.chars().count());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use reframe_protocol::ExampleRecord;
    use reframe_vector_store::RetrievedExample;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedBackend {
        fn with(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::default(),
            })
        }

        fn calls(&self) -> Vec<CompletionRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("reply".to_string()))
        }
    }

    fn gateway(backend: Arc<ScriptedBackend>) -> GenerationGateway {
        GenerationGateway::new(backend, RetryPolicy::new(3, Duration::from_millis(1)))
    }

    fn retrieval() -> RetrievalResult {
        RetrievalResult::new(
            (0..3)
                .map(|i| RetrievedExample {
                    index: i,
                    entry: ExampleRecord {
                        situation: format!("s{i}"),
                        thought: format!("t{i}"),
                        reframe: format!("r{i}"),
                    },
                    similarity: 0.5,
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn classify_uses_system_prompt_and_short_budget() {
        let backend = ScriptedBackend::with(vec![Ok("Labeling (80%)".into())]);
        let label = gateway(backend.clone())
            .classify("I am worthless", "Failed a test")
            .await
            .unwrap();
        assert_eq!(label, "Labeling (80%)");

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].sampling, SamplingParams::CLASSIFY);
        assert_eq!(calls[0].messages[0], ChatMessage::system(CLASSIFY_SYSTEM));
        assert!(calls[0].messages[1].content.ends_with("Thought: I am worthless\nCognitive Distortion:"));
    }

    #[tokio::test]
    async fn generate_includes_all_retrieved_examples() {
        let backend = ScriptedBackend::with(vec![]);
        let mut rng = StdRng::seed_from_u64(1);
        gateway(backend.clone())
            .generate("t", "s", &retrieval(), &mut rng)
            .await
            .unwrap();

        let calls = backend.calls();
        let prompt = &calls[0].messages[1].content;
        for i in 0..3 {
            assert!(prompt.contains(&format!("Rational Response: r{i}\n\n")));
        }
        assert_eq!(calls[0].sampling, SamplingParams::GENERATE);
    }

    #[tokio::test]
    async fn unknown_attribute_never_reaches_the_service() {
        let backend = ScriptedBackend::with(vec![]);
        let err = gateway(backend.clone())
            .rewrite("bogus", "You will be fine", "", "")
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::UnknownAttribute("bogus".into()));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn rewrite_sends_a_single_user_message() {
        let backend = ScriptedBackend::with(vec![Ok("softer".into())]);
        let out = gateway(backend.clone())
            .rewrite("empathy", "Try again", "", "")
            .await
            .unwrap();
        assert_eq!(out, "softer");
        let calls = backend.calls();
        assert_eq!(calls[0].messages.len(), 1);
        assert_eq!(calls[0].messages[0].role, "user");
    }

    #[tokio::test]
    async fn failures_propagate_after_retries() {
        let backend = ScriptedBackend::with(vec![
            Err(GenerationError::RateLimited),
            Err(GenerationError::RateLimited),
            Err(GenerationError::RateLimited),
        ]);
        let err = gateway(backend.clone()).classify("t", "s").await.unwrap_err();
        assert_eq!(err, GenerationError::RateLimited);
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test]
    async fn transient_failure_then_success() {
        let backend = ScriptedBackend::with(vec![
            Err(GenerationError::Upstream {
                status: 502,
                message: "bad gateway".into(),
            }),
            Ok("Catastrophizing (88%)".into()),
        ]);
        let label = gateway(backend.clone()).classify("t", "s").await.unwrap();
        assert_eq!(label, "Catastrophizing (88%)");
        assert_eq!(backend.calls().len(), 2);
    }
}
