//! Request flows over the shared, read-only service state.
//!
//! ```text
//! reframe:  find_similar(k) ─> generate ×3 (concurrent) ─> {reframes, similar_cases, retrieved_k}
//! control:  rewrite(attribute) ─> measure_all            ─> {controlled_reframe, attributes}
//! classify: few-shot label
//! measure:  measure_all
//! ```

mod config;
mod context;
mod error;
mod shuffle;

pub use config::{ServiceConfig, DEFAULT_CACHE_PATH, DEFAULT_CORPUS_PATH, DEFAULT_PORT};
pub use context::{
    classify, load_index, ControlOptions, ServiceContext, MAX_CONTROL_ATTEMPTS, REFRAME_CANDIDATES,
};
pub use error::{PipelineError, Result};
pub use shuffle::{fork, ShuffleSource};
