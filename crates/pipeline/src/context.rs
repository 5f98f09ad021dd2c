use crate::config::ServiceConfig;
use crate::error::{PipelineError, Result};
use crate::shuffle::{fork, ShuffleSource};
use reframe_attributes::AttributeScorer;
use reframe_generation::{ControlAttribute, GenerationGateway};
use reframe_protocol::{
    AttributeScores, ClassifyRequest, ClassifyResponse, ControlRequest, ControlResponse,
    MeasureRequest, ReframeRequest, ReframeResponse,
};
use reframe_vector_store::{Corpus, EmbeddingCache, EmbeddingIndex, EmbeddingModel};
use std::sync::Arc;

/// Candidates produced per reframe request.
pub const REFRAME_CANDIDATES: usize = 3;
pub const MAX_CONTROL_ATTEMPTS: u32 = 5;

/// Rewrite budget for the control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlOptions {
    pub max_attempts: u32,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self { max_attempts: 1 }
    }
}

/// Load the corpus and build its embedding index, reusing the persisted cache when it matches.
pub async fn load_index(config: &ServiceConfig) -> Result<EmbeddingIndex> {
    config.check_corpus()?;
    let corpus = Corpus::load_csv(&config.corpus_path)
        .map_err(|e| PipelineError::Startup(format!("{}: {e}", config.corpus_path.display())))?;
    let model = EmbeddingModel::new(&config.embedding)
        .map_err(|e| PipelineError::Startup(format!("embedding model: {e}")))?;
    log::info!(
        "Embedding model {} ({}-dim)",
        model.space_id(),
        model.dimension()
    );
    let cache = config.cache_path.as_ref().map(EmbeddingCache::new);
    let index = EmbeddingIndex::build(Arc::new(corpus), Arc::new(model), cache.as_ref())
        .await
        .map_err(|e| PipelineError::Startup(format!("building embedding index: {e}")))?;
    log::info!(
        "Index ready: {} entries, cache {:?}",
        index.len(),
        index.cache_outcome()
    );
    Ok(index)
}

/// Label the thinking trap in a thought. Needs only the generation service.
pub async fn classify(
    gateway: &GenerationGateway,
    request: ClassifyRequest,
) -> Result<ClassifyResponse> {
    require(&request.thought, "thought")?;
    let thinking_trap = gateway
        .classify(&request.thought, &request.situation)
        .await?;
    Ok(ClassifyResponse { thinking_trap })
}

/// Everything a request needs, built once at startup and shared read-only.
#[derive(Clone)]
pub struct ServiceContext {
    index: Arc<EmbeddingIndex>,
    scorer: AttributeScorer,
    gateway: GenerationGateway,
    shuffle: Arc<ShuffleSource>,
}

impl ServiceContext {
    /// Fails fast on a missing credential before touching the corpus or model.
    pub async fn initialize(config: &ServiceConfig) -> Result<Self> {
        config.openai_config()?;
        config.check_corpus()?;
        let gateway = config.gateway()?;
        let index = load_index(config).await?;
        Ok(Self::from_parts(
            Arc::new(index),
            gateway,
            ShuffleSource::new(config.shuffle_seed),
        ))
    }

    pub fn from_parts(
        index: Arc<EmbeddingIndex>,
        gateway: GenerationGateway,
        shuffle: ShuffleSource,
    ) -> Self {
        let scorer = AttributeScorer::new(Arc::clone(index.model()));
        Self {
            index,
            scorer,
            gateway,
            shuffle: Arc::new(shuffle),
        }
    }

    #[must_use]
    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    #[must_use]
    pub const fn scorer(&self) -> &AttributeScorer {
        &self.scorer
    }

    pub async fn classify(&self, request: ClassifyRequest) -> Result<ClassifyResponse> {
        classify(&self.gateway, request).await
    }

    /// Retrieve `k` similar cases and generate three independent candidates from them.
    pub async fn reframe(&self, request: ReframeRequest) -> Result<ReframeResponse> {
        require(&request.thought, "thought")?;
        require(&request.situation, "situation")?;
        let k = usize::try_from(request.k).map_err(|_| {
            PipelineError::InvalidArgument(format!(
                "k must be between 1 and {} (got {})",
                self.index.len(),
                request.k
            ))
        })?;

        let mut rng = self.shuffle.request_rng();
        let retrieval = self
            .index
            .find_similar(&request.thought, &request.situation, k, &mut rng)
            .await?;

        let (mut r1, mut r2, mut r3) = (fork(&mut rng), fork(&mut rng), fork(&mut rng));
        let (thought, situation) = (request.thought.as_str(), request.situation.as_str());
        let (a, b, c) = tokio::try_join!(
            self.gateway.generate(thought, situation, &retrieval, &mut r1),
            self.gateway.generate(thought, situation, &retrieval, &mut r2),
            self.gateway.generate(thought, situation, &retrieval, &mut r3),
        )?;
        let reframes = vec![a, b, c];
        debug_assert_eq!(reframes.len(), REFRAME_CANDIDATES);
        log::debug!(
            "reframe: {} candidates from {} retrieved cases",
            reframes.len(),
            retrieval.len()
        );

        Ok(ReframeResponse {
            reframes,
            similar_cases: retrieval.entries().cloned().collect(),
            retrieved_k: retrieval.len(),
        })
    }

    pub async fn measure(&self, request: MeasureRequest) -> Result<AttributeScores> {
        require(&request.reframe, "reframe")?;
        Ok(self
            .scorer
            .measure_all(&request.reframe, &request.thought, &request.situation)
            .await?)
    }

    /// Control flow with the budget taken from the request (single pass when absent).
    pub async fn control(&self, request: ControlRequest) -> Result<ControlResponse> {
        let options = match request.max_attempts {
            None => ControlOptions::default(),
            Some(n) if (1..=MAX_CONTROL_ATTEMPTS).contains(&n) => ControlOptions { max_attempts: n },
            Some(n) => {
                return Err(PipelineError::validation(format!(
                    "max_attempts must be in 1..={MAX_CONTROL_ATTEMPTS}, got {n}"
                )))
            }
        };
        self.control_with(request, options).await
    }

    /// Rewrite toward an attribute and re-measure.
    ///
    /// With `max_attempts == 1` this is one rewrite plus one measurement. With a
    /// larger budget each attempt rewrites the previous output; the loop stops
    /// once a rewrite scores above the input on the target attribute, or when an
    /// attempt does not improve on the one before it. The best rewrite wins.
    pub async fn control_with(
        &self,
        request: ControlRequest,
        options: ControlOptions,
    ) -> Result<ControlResponse> {
        require(&request.reframe, "reframe")?;
        require(&request.attribute, "attribute")?;
        let attribute: ControlAttribute = request.attribute.parse()?;
        if attribute.needs_context() {
            require(&request.thought, "thought")?;
            require(&request.situation, "situation")?;
        }
        let (thought, situation) = (request.thought.as_str(), request.situation.as_str());
        let max_attempts = options.max_attempts.max(1);

        let baseline = if max_attempts > 1 {
            let scores = self
                .scorer
                .measure_all(&request.reframe, thought, situation)
                .await?;
            Some(score_of(attribute, &scores))
        } else {
            None
        };

        let mut current = request.reframe;
        let mut best: Option<(String, AttributeScores)> = None;
        let mut previous = f64::NEG_INFINITY;
        let mut attempts = 0;

        while attempts < max_attempts {
            attempts += 1;
            let rewritten = self
                .gateway
                .rewrite_as(attribute, &current, thought, situation)
                .await?;
            let scores = self.scorer.measure_all(&rewritten, thought, situation).await?;
            let value = score_of(attribute, &scores);
            log::debug!("control {attribute}: attempt {attempts} scored {value}");

            if best
                .as_ref()
                .map_or(true, |(_, best_scores)| value > score_of(attribute, best_scores))
            {
                best = Some((rewritten.clone(), scores));
            }

            let beat_baseline = baseline.map_or(true, |base| value > base);
            let plateaued = attempts > 1 && value <= previous;
            if beat_baseline || plateaued {
                break;
            }
            previous = value;
            current = rewritten;
        }

        let (controlled_reframe, attributes) = best.ok_or_else(|| {
            PipelineError::Internal("control loop finished without a rewrite".to_string())
        })?;
        Ok(ControlResponse {
            controlled_reframe,
            attributes,
            attempts,
        })
    }
}

const fn score_of(attribute: ControlAttribute, scores: &AttributeScores) -> f64 {
    match attribute {
        ControlAttribute::Empathy => scores.empathy,
        ControlAttribute::Actionability => scores.actionability,
        ControlAttribute::Specificity => scores.specificity,
    }
}

fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(PipelineError::validation(format!("{field} is required")))
    } else {
        Ok(())
    }
}
