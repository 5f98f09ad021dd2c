use crate::error::{Result, VectorStoreError};
use reframe_protocol::ExampleRecord;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// A corpus row. Identity is its position in the corpus.
pub type CorpusEntry = ExampleRecord;

const REQUIRED_COLUMNS: [&str; 3] = ["situation", "thought", "reframe"];

/// Text embedded for both corpus rows and queries.
#[must_use]
pub fn embedding_text(thought: &str, situation: &str) -> String {
    format!("{thought} {situation}")
}

/// Immutable, ordered set of expert-labeled examples.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    entries: Vec<CorpusEntry>,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    situation: String,
    #[serde(default)]
    thought: String,
    #[serde(default)]
    reframe: String,
}

impl Corpus {
    #[must_use]
    pub fn from_entries(entries: Vec<CorpusEntry>) -> Self {
        Self { entries }
    }

    /// Load a delimited file with a header row containing at least
    /// `situation`, `thought` and `reframe`.
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            VectorStoreError::IoError(std::io::Error::new(
                e.kind(),
                format!("cannot open corpus {}: {e}", path.display()),
            ))
        })?;
        let corpus = Self::from_reader(file)?;
        log::info!(
            "Loaded corpus {} ({} rows)",
            path.display(),
            corpus.len()
        );
        Ok(corpus)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h.trim() == column) {
                return Err(VectorStoreError::InvalidArgument(format!(
                    "corpus is missing required column '{column}' (found: {})",
                    headers.iter().collect::<Vec<_>>().join(", ")
                )));
            }
        }

        let mut entries = Vec::new();
        let mut skipped = 0usize;
        for row in reader.deserialize::<CsvRow>() {
            let row = row?;
            if row.thought.trim().is_empty() || row.situation.trim().is_empty() {
                skipped += 1;
                continue;
            }
            entries.push(CorpusEntry {
                situation: row.situation,
                thought: row.thought,
                reframe: row.reframe,
            });
        }

        if skipped > 0 {
            log::warn!("Skipped {skipped} corpus rows with a blank thought or situation");
        }
        if entries.is_empty() {
            return Err(VectorStoreError::EmptyCorpus(
                "no row has both a thought and a situation".to_string(),
            ));
        }

        Ok(Self { entries })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&CorpusEntry> {
        self.entries.get(index)
    }

    #[must_use]
    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    /// Texts to embed, one per entry, in corpus order.
    #[must_use]
    pub fn embedding_texts(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| embedding_text(&e.thought, &e.situation))
            .collect()
    }

    /// Content hash binding a persisted embedding set to this exact corpus and model.
    #[must_use]
    pub fn fingerprint(&self, model_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model_id.as_bytes());
        hasher.update([0x1d]);
        hasher.update((self.entries.len() as u64).to_le_bytes());
        for entry in &self.entries {
            for field in [&entry.situation, &entry.thought, &entry.reframe] {
                hasher.update(field.as_bytes());
                hasher.update([0x1f]);
            }
            hasher.update([0x1e]);
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(situation: &str, thought: &str, reframe: &str) -> CorpusEntry {
        CorpusEntry {
            situation: situation.to_string(),
            thought: thought.to_string(),
            reframe: reframe.to_string(),
        }
    }

    #[test]
    fn parses_quoted_rows_and_ignores_extra_columns() {
        let raw = "id,situation,thought,reframe,label\n\
                   1,\"Exam, finals\",I will fail,\"One exam doesn't define you\",x\n\
                   2,Job interview,I'm not good enough,You prepared well,y\n";
        let corpus = Corpus::from_reader(raw.as_bytes()).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(
            corpus.get(0),
            Some(&entry("Exam, finals", "I will fail", "One exam doesn't define you"))
        );
    }

    #[test]
    fn skips_rows_without_thought_or_situation() {
        let raw = "situation,thought,reframe\nExam,,nothing\n,alone,nothing\nExam,I will fail,ok\n";
        let corpus = Corpus::from_reader(raw.as_bytes()).unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.entries()[0].thought, "I will fail");
    }

    #[test]
    fn missing_column_is_rejected() {
        let raw = "situation,thought\nExam,I will fail\n";
        let err = Corpus::from_reader(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidArgument(_)), "{err}");
    }

    #[test]
    fn corpus_without_usable_rows_is_an_error() {
        let raw = "situation,thought,reframe\n,,\n";
        let err = Corpus::from_reader(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, VectorStoreError::EmptyCorpus(_)), "{err}");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Corpus::load_csv(tmp.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, VectorStoreError::IoError(_)), "{err}");
    }

    #[test]
    fn embedding_text_joins_thought_then_situation() {
        let corpus = Corpus::from_entries(vec![entry("Exam", "I will fail", "r")]);
        assert_eq!(corpus.embedding_texts(), vec!["I will fail Exam".to_string()]);
    }

    #[test]
    fn fingerprint_tracks_content_order_and_model() {
        let a = Corpus::from_entries(vec![entry("s1", "t1", "r1"), entry("s2", "t2", "r2")]);
        let same = Corpus::from_entries(vec![entry("s1", "t1", "r1"), entry("s2", "t2", "r2")]);
        let swapped = Corpus::from_entries(vec![entry("s2", "t2", "r2"), entry("s1", "t1", "r1")]);
        let edited = Corpus::from_entries(vec![entry("s1", "t1", "r1"), entry("s2", "t2", "r3")]);

        assert_eq!(a.fingerprint("m"), same.fingerprint("m"));
        assert_eq!(a.fingerprint("m").len(), 64);
        assert_ne!(a.fingerprint("m"), swapped.fingerprint("m"));
        assert_ne!(a.fingerprint("m"), edited.fingerprint("m"));
        assert_ne!(a.fingerprint("m"), a.fingerprint("other-model"));
    }
}
