use crate::error::{Result, VectorStoreError};
use ndarray::{Array, Axis, Ix2, Ix3};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::{DynTensor, Tensor};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tokio::task::spawn_blocking;

pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm-l6-v2";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingMode {
    Onnx,
    Stub,
}

impl EmbeddingMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Onnx => "onnx",
            Self::Stub => "stub",
        }
    }
}

impl FromStr for EmbeddingMode {
    type Err = VectorStoreError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "onnx" | "fast" => Ok(Self::Onnx),
            "stub" => Ok(Self::Stub),
            other => Err(VectorStoreError::EmbeddingError(format!(
                "Unsupported embedding mode '{other}' (expected 'onnx' or 'stub')"
            ))),
        }
    }
}

impl Display for EmbeddingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to construct an [`EmbeddingModel`].
#[derive(Clone, Debug)]
pub struct EmbeddingSettings {
    pub mode: EmbeddingMode,
    pub model_id: String,
    pub model_dir: PathBuf,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::Onnx,
            model_id: DEFAULT_EMBEDDING_MODEL.to_string(),
            model_dir: PathBuf::from("models"),
        }
    }
}

#[derive(Clone, Debug)]
struct ModelSpec {
    id: String,
    dimension: usize,
    max_length: usize,
    max_batch: usize,
}

impl ModelSpec {
    fn lookup(raw: &str) -> Result<Self> {
        let id = normalize_model_id(raw);
        let (dimension, max_length) = match id.as_str() {
            "all-minilm-l6-v2" | "all-minilm-l12-v2" => (384, 256),
            "bge-small" => (384, 512),
            "all-mpnet-base-v2" => (768, 384),
            other => {
                return Err(VectorStoreError::EmbeddingError(format!(
                    "Unknown embedding model id '{other}'. Available: all-minilm-l6-v2, all-minilm-l12-v2, bge-small, all-mpnet-base-v2"
                )))
            }
        };
        Ok(Self {
            id,
            dimension,
            max_length,
            max_batch: 32,
        })
    }

    fn assets_in(&self, model_dir: &Path) -> (PathBuf, PathBuf) {
        let dir = model_dir.join(&self.id);
        (dir.join("model.onnx"), dir.join("tokenizer.json"))
    }
}

/// Canonical id for a model name, accepting Hugging Face style aliases.
pub fn normalize_model_id(raw: &str) -> String {
    let id = raw.trim().to_ascii_lowercase();
    let id = id
        .strip_prefix("sentence-transformers/")
        .or_else(|| id.strip_prefix("baai/"))
        .unwrap_or(&id);
    match id {
        "bge-small-en-v1.5" => "bge-small".to_string(),
        other => other.to_string(),
    }
}

struct OrtBackend {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_batch: usize,
    dimension: usize,
}

impl OrtBackend {
    fn new(spec: &ModelSpec, model_dir: &Path) -> Result<Self> {
        if !tokenizers::utils::parallelism::is_parallelism_configured() {
            tokenizers::utils::parallelism::set_parallelism(false);
        }

        let (model_path, tokenizer_path) = spec.assets_in(model_dir);
        if !model_path.exists() || !tokenizer_path.exists() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Model files for '{}' are missing. Expected ONNX at {} and tokenizer at {}. Run `reframe install-model` (or set REFRAME_MODEL_DIR).",
                spec.id,
                model_path.display(),
                tokenizer_path.display(),
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| VectorStoreError::EmbeddingError(format!("Tokenizer load failed: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: spec.max_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Tokenizer truncation failed: {e}"))
            })?;

        let threads = std::thread::available_parallelism()
            .map(|n| n.get().clamp(1, 4))
            .unwrap_or(1);
        let session = Session::builder()
            .map_err(|e| VectorStoreError::EmbeddingError(format!("{e}")))?
            .with_intra_threads(threads)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to set ORT intra threads: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to set optimization level: {e}"))
            })?
            .commit_from_file(&model_path)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to load ONNX model: {e}"))
            })?;

        log::info!(
            "Loaded ONNX embedding model '{}' (dim {}, max_length {})",
            spec.id,
            spec.dimension,
            spec.max_length
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_batch: spec.max_batch,
            dimension: spec.dimension,
        })
    }

    fn embed_batch_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch) {
            let encodings = self
                .tokenizer
                .encode_batch(batch.to_vec(), true)
                .map_err(|e| {
                    VectorStoreError::EmbeddingError(format!("Tokenization failed: {e}"))
                })?;
            if encodings.is_empty() {
                continue;
            }

            let seq_len = encodings[0].len();
            if encodings.iter().any(|e| e.len() != seq_len) {
                return Err(VectorStoreError::EmbeddingError(
                    "Inconsistent sequence lengths after padding".to_string(),
                ));
            }
            let (ids, masks, type_ids, mask_rows) = flat_inputs(&encodings, seq_len);

            let shape = (batch.len(), seq_len);
            let to_tensor = |data: Vec<i64>, what: &str| -> Result<DynTensor> {
                let array = Array::from_shape_vec(shape, data).map_err(|e| {
                    VectorStoreError::EmbeddingError(format!("{what} shape error: {e}"))
                })?;
                Ok(Tensor::from_array(array.into_dyn())
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("{e}")))?
                    .upcast())
            };

            let mut available: HashMap<String, DynTensor> = HashMap::new();
            available.insert("input_ids".to_string(), to_tensor(ids, "IDs")?);
            available.insert("attention_mask".to_string(), to_tensor(masks, "Mask")?);
            available.insert("token_type_ids".to_string(), to_tensor(type_ids, "Types")?);

            let array = {
                let mut session = self.session.lock().map_err(|_| {
                    VectorStoreError::EmbeddingError("Failed to lock ONNX session".into())
                })?;

                let mut feed: HashMap<String, DynTensor> = HashMap::new();
                for input in &session.inputs {
                    let value = available.remove(&input.name).ok_or_else(|| {
                        VectorStoreError::EmbeddingError(format!(
                            "Unsupported ONNX input '{}'",
                            input.name
                        ))
                    })?;
                    feed.insert(input.name.clone(), value);
                }

                let outputs = session.run(SessionInputs::from(feed)).map_err(|e| {
                    VectorStoreError::EmbeddingError(format!("ONNX forward failed: {e}"))
                })?;
                if outputs.len() == 0 {
                    return Err(VectorStoreError::EmbeddingError(
                        "ONNX returned no outputs".to_string(),
                    ));
                }
                let array = outputs[0]
                    .try_extract_array::<f32>()
                    .map_err(|e| {
                        VectorStoreError::EmbeddingError(format!(
                            "Failed to decode ONNX output: {e}"
                        ))
                    })?
                    .to_owned();
                drop(outputs);
                drop(session);
                array
            };
            results.extend(pooled_rows(array, &mask_rows, self.dimension)?);
        }
        Ok(results)
    }
}

fn flat_inputs(
    encodings: &[Encoding],
    seq_len: usize,
) -> (Vec<i64>, Vec<i64>, Vec<i64>, Vec<Vec<i64>>) {
    let mut ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut masks = Vec::with_capacity(encodings.len() * seq_len);
    let mut type_ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut mask_rows = Vec::with_capacity(encodings.len());

    for encoding in encodings {
        let row_ids = encoding.get_ids();
        let row_mask = encoding.get_attention_mask();
        let row_types = encoding.get_type_ids();
        for idx in 0..seq_len {
            ids.push(i64::from(*row_ids.get(idx).unwrap_or(&0)));
            masks.push(i64::from(*row_mask.get(idx).unwrap_or(&0)));
            type_ids.push(i64::from(*row_types.get(idx).unwrap_or(&0)));
        }
        mask_rows.push(row_mask.iter().take(seq_len).map(|v| i64::from(*v)).collect());
    }

    (ids, masks, type_ids, mask_rows)
}

/// Sentence-transformer exports emit either pooled `[batch, dim]` or token-level
/// `[batch, seq, dim]` outputs; the latter is mean-pooled under the attention mask.
fn pooled_rows(
    array: ndarray::ArrayD<f32>,
    mask_rows: &[Vec<i64>],
    expected_dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::new();
    match array.ndim() {
        2 => {
            let rows = array
                .into_dimensionality::<Ix2>()
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Bad output shape: {e}")))?;
            for row in rows.outer_iter() {
                let mut emb = row.to_vec();
                ensure_dimension(&emb, expected_dimension)?;
                normalize(&mut emb);
                out.push(emb);
            }
        }
        3 => {
            let hidden = array
                .into_dimensionality::<Ix3>()
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Bad output shape: {e}")))?;
            for (idx, sample) in hidden.outer_iter().enumerate() {
                let mask = mask_rows
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| vec![1; sample.len_of(Axis(0))]);
                let mut emb = mean_pool(sample, &mask);
                ensure_dimension(&emb, expected_dimension)?;
                normalize(&mut emb);
                out.push(emb);
            }
        }
        _ => {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Unexpected ONNX output dims: {:?}",
                array.shape()
            )));
        }
    }
    Ok(out)
}

fn mean_pool(sample: ndarray::ArrayView2<'_, f32>, mask: &[i64]) -> Vec<f32> {
    let hidden = sample.len_of(Axis(1));
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;
    for (token_idx, token) in sample.outer_iter().enumerate() {
        if *mask.get(token_idx).unwrap_or(&0) == 0 {
            continue;
        }
        count += 1.0;
        for (dim, value) in token.iter().enumerate() {
            sum[dim] += value;
        }
    }
    if count > 0.0 {
        for value in &mut sum {
            *value /= count;
        }
    }
    sum
}

const fn ensure_dimension(vec: &[f32], expected: usize) -> Result<()> {
    if vec.len() != expected {
        return Err(VectorStoreError::InvalidDimension {
            expected,
            actual: vec.len(),
        });
    }
    Ok(())
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

/// Deterministic hash-seeded unit vector; stands in for a real model in tests.
fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let mantissa = ((bits >> 32) as u32) >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

enum EmbeddingBackend {
    Ort(Arc<OrtBackend>),
    Stub,
}

/// Sentence embedding model shared by retrieval and the specificity score.
pub struct EmbeddingModel {
    backend: EmbeddingBackend,
    mode: EmbeddingMode,
    model_id: String,
    dimension: usize,
}

impl EmbeddingModel {
    /// Load the model described by `settings`. ONNX assets are read eagerly so a
    /// missing model fails at startup rather than on the first request.
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let spec = ModelSpec::lookup(&settings.model_id)?;
        let backend = match settings.mode {
            EmbeddingMode::Stub => EmbeddingBackend::Stub,
            EmbeddingMode::Onnx => {
                EmbeddingBackend::Ort(Arc::new(OrtBackend::new(&spec, &settings.model_dir)?))
            }
        };
        Ok(Self {
            backend,
            mode: settings.mode,
            model_id: spec.id,
            dimension: spec.dimension,
        })
    }

    /// Stub model of an arbitrary dimension.
    #[must_use]
    pub fn stub(dimension: usize) -> Self {
        Self {
            backend: EmbeddingBackend::Stub,
            mode: EmbeddingMode::Stub,
            model_id: format!("stub-{dimension}"),
            dimension,
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub const fn mode(&self) -> EmbeddingMode {
        self.mode
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Identity of the vector space, used to key persisted embeddings.
    #[must_use]
    pub fn space_id(&self) -> String {
        format!("{}:{}:{}", self.mode, self.model_id, self.dimension)
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(vec![text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("Empty embedding result".to_string()))
    }

    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let vectors = match &self.backend {
            EmbeddingBackend::Stub => texts
                .iter()
                .map(|text| stub_embed(text, self.dimension))
                .collect(),
            EmbeddingBackend::Ort(backend) => {
                let backend = backend.clone();
                spawn_blocking(move || backend.embed_batch_blocking(&texts))
                    .await
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("Join error: {e}")))??
            }
        };
        Ok(vectors)
    }
}

/// Cosine similarity of two vectors. Fails on a dimension mismatch or a zero-norm input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(VectorStoreError::InvalidDimension {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(VectorStoreError::DegenerateVector(
            "cosine similarity is undefined for a zero-norm vector".to_string(),
        ));
    }
    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

pub(crate) fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
