use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Number of neighbours retrieved for a reframe request when the caller omits `k`.
pub const DEFAULT_K: i64 = 5;

/// A labeled example as it appears in the corpus and in API responses.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ExampleRecord {
    pub situation: String,
    pub thought: String,
    pub reframe: String,
}

/// Heuristic attribute scores for a reframe, each rounded to 3 decimals.
///
/// `specificity` is a raw cosine similarity and may be negative; the three
/// lexical scores are clamped to `[0, 1]`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct AttributeScores {
    pub specificity: f64,
    pub actionability: f64,
    pub empathy: f64,
    pub positivity: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ClassifyRequest {
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub situation: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClassifyResponse {
    pub thinking_trap: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReframeRequest {
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub situation: String,
    #[serde(default = "default_k")]
    pub k: i64,
}

const fn default_k() -> i64 {
    DEFAULT_K
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReframeResponse {
    pub reframes: Vec<String>,
    pub similar_cases: Vec<ExampleRecord>,
    pub retrieved_k: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MeasureRequest {
    #[serde(default)]
    pub reframe: String,
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub situation: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ControlRequest {
    #[serde(default)]
    pub reframe: String,
    #[serde(default)]
    pub attribute: String,
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub situation: String,
    /// Rewrite budget; absent means a single pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ControlResponse {
    pub controlled_reframe: String,
    pub attributes: AttributeScores,
    pub attempts: u32,
}

/// One retrieval hit with its similarity, as printed by the `search` command.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SimilarCase {
    pub index: usize,
    pub similarity: f32,
    #[serde(flatten)]
    pub record: ExampleRecord,
}

/// Error body returned by every failing route.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}
