use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corpus parse error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Degenerate vector: {0}")]
    DegenerateVector(String),

    #[error("Embedding cache does not match corpus: {0}")]
    CacheConsistency(String),

    #[error("Corpus has no usable rows: {0}")]
    EmptyCorpus(String),
}
