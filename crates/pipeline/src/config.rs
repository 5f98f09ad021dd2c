use crate::error::{PipelineError, Result};
use reframe_generation::{
    GenerationGateway, OpenAiConfig, RetryPolicy, DEFAULT_API_BASE, DEFAULT_CHAT_MODEL,
};
use reframe_vector_store::{EmbeddingMode, EmbeddingSettings, DEFAULT_EMBEDDING_MODEL};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CORPUS_PATH: &str = "data/reframing_dataset.csv";
pub const DEFAULT_CACHE_PATH: &str = "embeddings_cache.bin";
pub const DEFAULT_PORT: u16 = 8000;

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub chat_model: String,
    pub corpus_path: PathBuf,
    /// `None` disables the persisted embedding cache.
    pub cache_path: Option<PathBuf>,
    pub embedding: EmbeddingSettings,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub shuffle_seed: Option<u64>,
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            corpus_path: PathBuf::from(DEFAULT_CORPUS_PATH),
            cache_path: Some(PathBuf::from(DEFAULT_CACHE_PATH)),
            embedding: EmbeddingSettings {
                mode: EmbeddingMode::Onnx,
                model_id: DEFAULT_EMBEDDING_MODEL.to_string(),
                model_dir: PathBuf::from("models"),
            },
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_base: Duration::from_millis(500),
            shuffle_seed: None,
            port: DEFAULT_PORT,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| -> Option<String> {
            keys.iter().find_map(|key| {
                lookup(key)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
            })
        };

        let mut config = Self {
            api_key: get(&["REFRAME_API_KEY", "OPENAI_API_KEY"]),
            ..Self::default()
        };
        if let Some(base) = get(&["REFRAME_API_BASE"]) {
            config.api_base = base;
        }
        if let Some(model) = get(&["REFRAME_CHAT_MODEL"]) {
            config.chat_model = model;
        }
        if let Some(path) = get(&["REFRAME_CORPUS"]) {
            config.corpus_path = PathBuf::from(path);
        }
        if let Some(path) = get(&["REFRAME_EMBEDDING_CACHE"]) {
            config.cache_path = Some(PathBuf::from(path));
        }
        if let Some(mode) = get(&["REFRAME_EMBEDDING_MODE"]) {
            config.embedding.mode = mode
                .parse()
                .map_err(|e| PipelineError::Startup(format!("REFRAME_EMBEDDING_MODE: {e}")))?;
        }
        if let Some(model) = get(&["REFRAME_EMBEDDING_MODEL"]) {
            config.embedding.model_id = model;
        }
        if let Some(dir) = get(&["REFRAME_MODEL_DIR"]) {
            config.embedding.model_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get(&["REFRAME_REQUEST_TIMEOUT_SECS"]) {
            config.request_timeout = Duration::from_secs(parse_number("REFRAME_REQUEST_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = get(&["REFRAME_MAX_ATTEMPTS"]) {
            config.max_attempts = parse_number("REFRAME_MAX_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = get(&["REFRAME_RETRY_BASE_MS"]) {
            config.retry_base = Duration::from_millis(parse_number("REFRAME_RETRY_BASE_MS", &raw)?);
        }
        if let Some(raw) = get(&["REFRAME_SHUFFLE_SEED"]) {
            config.shuffle_seed = Some(parse_number("REFRAME_SHUFFLE_SEED", &raw)?);
        }
        if let Some(raw) = get(&["PORT"]) {
            config.port = parse_number("PORT", &raw)?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_base)
    }

    /// Generation backend settings; fails when no credential is configured.
    pub fn openai_config(&self) -> Result<OpenAiConfig> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            PipelineError::Startup(
                "no API credential: set REFRAME_API_KEY (or OPENAI_API_KEY)".to_string(),
            )
        })?;
        Ok(OpenAiConfig {
            api_base: self.api_base.clone(),
            api_key,
            model: self.chat_model.clone(),
            timeout: self.request_timeout,
        })
    }

    /// Gateway to the generation service with the configured retry policy.
    pub fn gateway(&self) -> Result<GenerationGateway> {
        Ok(GenerationGateway::openai(
            self.openai_config()?,
            self.retry_policy(),
        )?)
    }

    /// Corpus file must exist before anything expensive is loaded.
    pub fn check_corpus(&self) -> Result<()> {
        if self.corpus_path.is_file() {
            Ok(())
        } else {
            Err(PipelineError::Startup(format!(
                "corpus file not found: {}",
                self.corpus_path.display()
            )))
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| PipelineError::Startup(format!("{key}={raw:?} is not valid: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_key, None);
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.corpus_path, PathBuf::from("data/reframing_dataset.csv"));
        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:8000");
        assert_eq!(config.max_attempts, 3);
        assert!(config.openai_config().is_err());
    }

    #[test]
    fn gateway_needs_only_a_credential() {
        let config = ServiceConfig::from_lookup(lookup(&[("REFRAME_CORPUS", "/nonexistent.csv")]))
            .unwrap();
        assert!(matches!(config.gateway(), Err(PipelineError::Startup(_))));

        let config = ServiceConfig::from_lookup(lookup(&[
            ("REFRAME_API_KEY", "sk-test"),
            ("REFRAME_CORPUS", "/nonexistent.csv"),
        ]))
        .unwrap();
        assert!(config.check_corpus().is_err());
        assert!(config.gateway().is_ok());
    }

    #[test]
    fn primary_key_wins_over_fallback() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("REFRAME_API_KEY", "sk-primary"),
            ("OPENAI_API_KEY", "sk-fallback"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-primary"));

        let config =
            ServiceConfig::from_lookup(lookup(&[("REFRAME_API_KEY", " "), ("OPENAI_API_KEY", "sk-fallback")]))
                .unwrap();
        assert_eq!(config.openai_config().unwrap().api_key, "sk-fallback");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("REFRAME_EMBEDDING_MODE", "stub"),
            ("REFRAME_SHUFFLE_SEED", "42"),
            ("REFRAME_REQUEST_TIMEOUT_SECS", "5"),
            ("PORT", "9001"),
        ]))
        .unwrap();
        assert_eq!(config.embedding.mode, EmbeddingMode::Stub);
        assert_eq!(config.shuffle_seed, Some(42));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.port, 9001);
    }

    #[test]
    fn malformed_numbers_fail_startup() {
        let err = ServiceConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(err.code(), "startup_error");
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn missing_corpus_is_reported() {
        let config = ServiceConfig {
            corpus_path: PathBuf::from("/nonexistent/reframing.csv"),
            ..ServiceConfig::default()
        };
        let err = config.check_corpus().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/reframing.csv"));
    }
}
