use crate::corpus::CorpusEntry;
use serde::{Deserialize, Serialize};

/// One retrieved corpus entry with its cosine similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedExample {
    pub index: usize,
    pub entry: CorpusEntry,
    pub similarity: f32,
}

/// Exactly `k` hits: the top-k set by similarity, in a random order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    hits: Vec<RetrievedExample>,
}

impl RetrievalResult {
    #[must_use]
    pub fn new(hits: Vec<RetrievedExample>) -> Self {
        Self { hits }
    }

    #[must_use]
    pub fn hits(&self) -> &[RetrievedExample] {
        &self.hits
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CorpusEntry> {
        self.hits.iter().map(|hit| &hit.entry)
    }
}

/// How the index obtained its corpus embeddings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CacheOutcome {
    Hit,
    Built,
    Rebuilt { reason: String },
    Uncached,
}
