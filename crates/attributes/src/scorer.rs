use crate::lexicon;
use reframe_protocol::AttributeScores;
use reframe_vector_store::{cosine_similarity, embedding_text, EmbeddingModel, Result};
use std::sync::Arc;

/// Scores a reframe along four behavioral attributes.
///
/// Stateless apart from the shared embedding model; scores are recomputed on
/// every call and never cached.
#[derive(Clone)]
pub struct AttributeScorer {
    model: Arc<EmbeddingModel>,
}

impl AttributeScorer {
    #[must_use]
    pub const fn new(model: Arc<EmbeddingModel>) -> Self {
        Self { model }
    }

    /// Raw cosine between the reframe and `thought + " " + situation`.
    ///
    /// Not clamped to `[0, 1]`: an unrelated reframe can score below zero.
    pub async fn specificity(&self, reframe: &str, thought: &str, situation: &str) -> Result<f64> {
        let vectors = self
            .model
            .embed_batch(vec![reframe.to_string(), embedding_text(thought, situation)])
            .await?;
        let [reframe_vec, context_vec] = vectors.as_slice() else {
            return Err(reframe_vector_store::VectorStoreError::EmbeddingError(format!(
                "expected 2 embeddings, got {}",
                vectors.len()
            )));
        };
        Ok(f64::from(cosine_similarity(reframe_vec, context_vec)?))
    }

    #[must_use]
    pub fn actionability(&self, reframe: &str) -> f64 {
        lexicon::actionability(reframe)
    }

    #[must_use]
    pub fn empathy(&self, reframe: &str) -> f64 {
        lexicon::empathy(reframe)
    }

    #[must_use]
    pub fn positivity(&self, reframe: &str) -> f64 {
        lexicon::positivity(reframe)
    }

    pub async fn measure_all(
        &self,
        reframe: &str,
        thought: &str,
        situation: &str,
    ) -> Result<AttributeScores> {
        let specificity = self.specificity(reframe, thought, situation).await?;
        let scores = AttributeScores {
            specificity: lexicon::round3(specificity),
            actionability: lexicon::round3(self.actionability(reframe)),
            empathy: lexicon::round3(self.empathy(reframe)),
            positivity: lexicon::round3(self.positivity(reframe)),
        };
        log::debug!(
            "measured reframe ({} chars): {:?}",
            reframe.chars().count(),
            scores
        );
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scorer() -> AttributeScorer {
        AttributeScorer::new(Arc::new(EmbeddingModel::stub(64)))
    }

    #[tokio::test]
    async fn measure_all_matches_reference_scenario() {
        let scores = scorer()
            .measure_all(
                "You can try to practice and plan next steps, and it's okay to feel upset, you are not worthless.",
                "I am worthless",
                "Failed a test",
            )
            .await
            .unwrap();
        assert_eq!(scores.actionability, 1.0);
        assert_eq!(scores.empathy, 0.667);
        assert_eq!(scores.positivity, 0.25);
        assert!((-1.0..=1.0).contains(&scores.specificity));
    }

    #[tokio::test]
    async fn measure_all_is_deterministic() {
        let scorer = scorer();
        let a = scorer.measure_all("It will get better", "t", "s").await.unwrap();
        let b = scorer.measure_all("It will get better", "t", "s").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn specificity_is_one_for_identical_text() {
        let sim = scorer()
            .specificity("I will fail Exam", "I will fail", "Exam")
            .await
            .unwrap();
        assert!((sim - 1.0).abs() < 1e-6, "{sim}");
    }
}
