//! # Reframe Vector Store
//!
//! Similarity retrieval over an expert-labeled reframing corpus.
//!
//! ## Architecture
//!
//! ```text
//! reframing_dataset.csv
//!     │
//!     ├──> Corpus (situation, thought, reframe)
//!     │      └─> fingerprint (SHA-256 of content + model)
//!     │
//!     ├──> EmbeddingModel (ONNX sentence-transformer | stub)
//!     │      └─> Vector[384]  of  "thought situation"
//!     │
//!     ├──> EmbeddingCache (fingerprinted binary file)
//!     │
//!     └──> EmbeddingIndex
//!            └─> cosine top-k, then shuffled
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use reframe_vector_store::{Corpus, EmbeddingCache, EmbeddingIndex, EmbeddingModel};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let corpus = Arc::new(Corpus::load_csv("data/reframing_dataset.csv")?);
//!     let model = Arc::new(EmbeddingModel::stub(384));
//!     let cache = EmbeddingCache::new("embeddings_cache.bin");
//!     let index = EmbeddingIndex::build(corpus, model, Some(&cache)).await?;
//!
//!     let mut rng = rand::thread_rng();
//!     let result = index
//!         .find_similar("I'll never finish my PhD", "My research project failed", 5, &mut rng)
//!         .await?;
//!     for hit in result.hits() {
//!         println!("{:.3} {}", hit.similarity, hit.entry.reframe);
//!     }
//!     Ok(())
//! }
//! ```

mod corpus;
mod embedding_cache;
mod embeddings;
mod error;
mod index;
mod types;

pub use corpus::{embedding_text, Corpus, CorpusEntry};
pub use embedding_cache::{CacheLookup, EmbeddingCache};
pub use embeddings::{
    cosine_similarity, normalize_model_id, EmbeddingMode, EmbeddingModel, EmbeddingSettings,
    DEFAULT_EMBEDDING_MODEL,
};
pub use error::{Result, VectorStoreError};
pub use index::EmbeddingIndex;
pub use types::{CacheOutcome, RetrievalResult, RetrievedExample};
