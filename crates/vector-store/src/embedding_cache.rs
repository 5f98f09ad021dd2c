use crate::error::{Result, VectorStoreError};
use std::path::{Path, PathBuf};

const CACHE_MAGIC: &[u8; 4] = b"RFE1";
const FINGERPRINT_LEN: usize = 64;
const HEADER_LEN: usize = 4 + FINGERPRINT_LEN + 4 + 4;

/// Result of probing the cache for a given corpus fingerprint and shape.
#[derive(Debug)]
pub enum CacheLookup {
    Hit(Vec<Vec<f32>>),
    Missing,
    Stale(VectorStoreError),
}

/// One file holding every corpus embedding, in corpus order, keyed by the
/// corpus fingerprint.
#[derive(Clone, Debug)]
pub struct EmbeddingCache {
    path: PathBuf,
}

impl EmbeddingCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self, fingerprint: &str, rows: usize, dimension: usize) -> Result<CacheLookup> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CacheLookup::Missing)
            }
            Err(err) => return Err(err.into()),
        };
        Ok(match decode(&bytes, fingerprint, rows, dimension) {
            Ok(vectors) => CacheLookup::Hit(vectors),
            Err(reason) => CacheLookup::Stale(VectorStoreError::CacheConsistency(format!(
                "{}: {reason}",
                self.path.display()
            ))),
        })
    }

    /// Write via a process-unique temp file and an atomic rename, so a racing
    /// reader sees either the old file or the complete new one.
    pub async fn store(&self, fingerprint: &str, vectors: &[Vec<f32>]) -> Result<()> {
        let bytes = encode(fingerprint, vectors)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(err) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        log::info!(
            "Saved {} embeddings to {}",
            vectors.len(),
            self.path.display()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "embeddings".to_string());
        let nonce: u32 = rand::random();
        self.path
            .with_file_name(format!(".{name}.{}.{nonce:08x}.tmp", std::process::id()))
    }
}

fn encode(fingerprint: &str, vectors: &[Vec<f32>]) -> Result<Vec<u8>> {
    if fingerprint.len() != FINGERPRINT_LEN || !fingerprint.is_ascii() {
        return Err(VectorStoreError::InvalidArgument(format!(
            "cache fingerprint must be {FINGERPRINT_LEN} ASCII hex chars"
        )));
    }
    let dimension = vectors.first().map_or(0, Vec::len);
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(VectorStoreError::InvalidDimension {
            expected: dimension,
            actual: bad.len(),
        });
    }
    let rows = u32::try_from(vectors.len())
        .map_err(|_| VectorStoreError::InvalidArgument("too many rows to cache".to_string()))?;
    let dim = u32::try_from(dimension)
        .map_err(|_| VectorStoreError::InvalidArgument("dimension too large".to_string()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + vectors.len() * dimension * 4);
    out.extend_from_slice(CACHE_MAGIC);
    out.extend_from_slice(fingerprint.as_bytes());
    out.extend_from_slice(&rows.to_le_bytes());
    out.extend_from_slice(&dim.to_le_bytes());
    for value in vectors.iter().flatten() {
        out.extend_from_slice(&value.to_le_bytes());
    }
    Ok(out)
}

fn decode(
    bytes: &[u8],
    fingerprint: &str,
    expected_rows: usize,
    expected_dimension: usize,
) -> std::result::Result<Vec<Vec<f32>>, String> {
    if bytes.len() < HEADER_LEN || &bytes[0..4] != CACHE_MAGIC {
        return Err("unrecognized cache header".to_string());
    }
    let stored_fingerprint = &bytes[4..4 + FINGERPRINT_LEN];
    if stored_fingerprint != fingerprint.as_bytes() {
        return Err("corpus fingerprint changed".to_string());
    }
    let mut offset = 4 + FINGERPRINT_LEN;
    let rows = read_u32(bytes, offset) as usize;
    offset += 4;
    let dimension = read_u32(bytes, offset) as usize;
    offset += 4;
    if rows != expected_rows {
        return Err(format!("cache holds {rows} rows, corpus has {expected_rows}"));
    }
    if dimension != expected_dimension {
        return Err(format!(
            "cache dimension {dimension}, model dimension {expected_dimension}"
        ));
    }
    let expected_len = HEADER_LEN.saturating_add(rows.saturating_mul(dimension).saturating_mul(4));
    if bytes.len() != expected_len {
        return Err(format!(
            "cache is {} bytes, expected {expected_len}",
            bytes.len()
        ));
    }

    let mut vectors = Vec::with_capacity(rows);
    for row in bytes[offset..].chunks_exact(dimension.max(1) * 4).take(rows) {
        vectors.push(
            row.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        );
    }
    Ok(vectors)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
