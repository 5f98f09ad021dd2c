use crate::corpus::{embedding_text, Corpus};
use crate::embedding_cache::{CacheLookup, EmbeddingCache};
use crate::embeddings::{l2_norm, EmbeddingModel};
use crate::error::{Result, VectorStoreError};
use crate::types::{CacheOutcome, RetrievalResult, RetrievedExample};
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::Rng;
use std::cmp::Ordering;
use std::sync::Arc;

/// Cosine-similarity index over every corpus entry.
///
/// Built once at startup and read-only afterwards, so it can be shared across
/// concurrent requests behind an `Arc`.
pub struct EmbeddingIndex {
    corpus: Arc<Corpus>,
    model: Arc<EmbeddingModel>,
    matrix: Array2<f32>,
    norms: Array1<f32>,
    fingerprint: String,
    cache_outcome: CacheOutcome,
}

impl EmbeddingIndex {
    /// Embed `thought + " " + situation` for every entry, or bind a persisted
    /// embedding set by position when its fingerprint matches this corpus.
    pub async fn build(
        corpus: Arc<Corpus>,
        model: Arc<EmbeddingModel>,
        cache: Option<&EmbeddingCache>,
    ) -> Result<Self> {
        let dimension = model.dimension();
        let fingerprint = corpus.fingerprint(&model.space_id());

        let lookup = match cache {
            Some(cache) if !corpus.is_empty() => {
                cache.load(&fingerprint, corpus.len(), dimension).await?
            }
            _ => CacheLookup::Missing,
        };

        let (vectors, cache_outcome) = match lookup {
            CacheLookup::Hit(vectors) => {
                log::info!("Loaded {} embeddings from cache", vectors.len());
                (vectors, CacheOutcome::Hit)
            }
            CacheLookup::Missing => {
                let vectors = embed_corpus(&corpus, &model).await?;
                let outcome = match cache {
                    Some(cache) if !corpus.is_empty() => {
                        cache.store(&fingerprint, &vectors).await?;
                        CacheOutcome::Built
                    }
                    _ => CacheOutcome::Uncached,
                };
                (vectors, outcome)
            }
            CacheLookup::Stale(reason) => {
                log::warn!("{reason}; recomputing embeddings");
                let vectors = embed_corpus(&corpus, &model).await?;
                if let Some(cache) = cache {
                    cache.store(&fingerprint, &vectors).await?;
                }
                (
                    vectors,
                    CacheOutcome::Rebuilt {
                        reason: reason.to_string(),
                    },
                )
            }
        };

        let (matrix, norms) = into_matrix(vectors, dimension)?;
        Ok(Self {
            corpus,
            model,
            matrix,
            norms,
            fingerprint,
            cache_outcome,
        })
    }

    #[must_use]
    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    #[must_use]
    pub fn model(&self) -> &Arc<EmbeddingModel> {
        &self.model
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.matrix.ncols()
    }

    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub const fn cache_outcome(&self) -> &CacheOutcome {
        &self.cache_outcome
    }

    /// Embedding of corpus entry `index`.
    #[must_use]
    pub fn embedding(&self, index: usize) -> Option<Vec<f32>> {
        (index < self.matrix.nrows()).then(|| self.matrix.row(index).to_vec())
    }

    /// Top-`k` corpus entries for the query, in a uniformly random order.
    ///
    /// Membership is deterministic (ties resolved by corpus order); only the
    /// order of the returned hits depends on `rng`.
    pub async fn find_similar<R: Rng + ?Sized>(
        &self,
        thought: &str,
        situation: &str,
        k: usize,
        rng: &mut R,
    ) -> Result<RetrievalResult> {
        self.check_k(k)?;
        let text = embedding_text(thought, situation);
        if text.trim().is_empty() {
            return Err(VectorStoreError::DegenerateVector(
                "query thought and situation are blank".to_string(),
            ));
        }
        let query = self.model.embed(&text).await?;
        let ranked = self.rank(&query, k)?;

        let mut hits: Vec<RetrievedExample> = ranked
            .into_iter()
            .filter_map(|(index, similarity)| {
                self.corpus.get(index).map(|entry| RetrievedExample {
                    index,
                    entry: entry.clone(),
                    similarity,
                })
            })
            .collect();
        hits.shuffle(rng);

        for (pos, hit) in hits.iter().enumerate() {
            log::debug!(
                "retrieval slot {} -> entry {} (similarity {:.3})",
                pos + 1,
                hit.index,
                hit.similarity
            );
        }
        Ok(RetrievalResult::new(hits))
    }

    /// Deterministic top-`k` `(index, similarity)` pairs, best first.
    pub fn rank(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        self.check_k(k)?;
        if query.len() != self.dimension() {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension(),
                actual: query.len(),
            });
        }
        let query_norm = l2_norm(query);
        if query_norm == 0.0 || !query_norm.is_finite() {
            return Err(VectorStoreError::DegenerateVector(
                "query embedding has zero norm".to_string(),
            ));
        }

        let q = Array1::from_vec(query.to_vec());
        let dots = self.matrix.dot(&q);
        let sims: Vec<f32> = dots
            .iter()
            .zip(self.norms.iter())
            .map(|(dot, norm)| (dot / (norm * query_norm)).clamp(-1.0, 1.0))
            .collect();

        let mut order: Vec<usize> = (0..sims.len()).collect();
        // Stable sort: equal similarities keep corpus order.
        order.sort_by(|&a, &b| sims[b].partial_cmp(&sims[a]).unwrap_or(Ordering::Equal));
        order.truncate(k);
        Ok(order.into_iter().map(|idx| (idx, sims[idx])).collect())
    }

    fn check_k(&self, k: usize) -> Result<()> {
        if self.corpus.is_empty() {
            return Err(VectorStoreError::InvalidArgument(
                "corpus is empty".to_string(),
            ));
        }
        if k < 1 || k > self.corpus.len() {
            return Err(VectorStoreError::InvalidArgument(format!(
                "k must be between 1 and {} (got {k})",
                self.corpus.len()
            )));
        }
        Ok(())
    }
}

async fn embed_corpus(corpus: &Corpus, model: &EmbeddingModel) -> Result<Vec<Vec<f32>>> {
    log::info!(
        "Embedding {} corpus entries with {}",
        corpus.len(),
        model.space_id()
    );
    model.embed_batch(corpus.embedding_texts()).await
}

fn into_matrix(vectors: Vec<Vec<f32>>, dimension: usize) -> Result<(Array2<f32>, Array1<f32>)> {
    let rows = vectors.len();
    let mut flat = Vec::with_capacity(rows * dimension);
    let mut norms = Vec::with_capacity(rows);
    for (idx, vector) in vectors.into_iter().enumerate() {
        if vector.len() != dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: dimension,
                actual: vector.len(),
            });
        }
        let norm = l2_norm(&vector);
        if norm == 0.0 || !norm.is_finite() {
            return Err(VectorStoreError::DegenerateVector(format!(
                "corpus entry {idx} has a zero-norm embedding"
            )));
        }
        norms.push(norm);
        flat.extend(vector);
    }
    let matrix = Array2::from_shape_vec((rows, dimension), flat)
        .map_err(|e| VectorStoreError::EmbeddingError(format!("embedding matrix: {e}")))?;
    Ok((matrix, Array1::from_vec(norms)))
}
