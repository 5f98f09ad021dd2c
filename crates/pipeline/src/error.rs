use reframe_generation::GenerationError;
use reframe_vector_store::VectorStoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Degenerate vector: {0}")]
    DegenerateVector(String),

    #[error("External service error: {0}")]
    ExternalService(#[source] GenerationError),

    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// HTTP status for this failure class.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::UnknownAttribute(_) => 400,
            Self::InvalidArgument(_) | Self::DegenerateVector(_) => 422,
            Self::ExternalService(err) => {
                if err.is_transient() {
                    503
                } else {
                    502
                }
            }
            Self::Startup(_) | Self::Internal(_) => 500,
        }
    }

    /// Machine-readable code carried in error bodies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::UnknownAttribute(_) => "unknown_attribute",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::DegenerateVector(_) => "degenerate_vector",
            Self::ExternalService(_) => "external_service_error",
            Self::Startup(_) => "startup_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<VectorStoreError> for PipelineError {
    fn from(err: VectorStoreError) -> Self {
        match err {
            VectorStoreError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            VectorStoreError::DegenerateVector(msg) => Self::DegenerateVector(msg),
            VectorStoreError::EmptyCorpus(msg) => Self::Startup(format!("corpus has no usable rows: {msg}")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<GenerationError> for PipelineError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::UnknownAttribute(name) => Self::UnknownAttribute(name),
            GenerationError::MissingCredential(msg) => Self::Startup(msg),
            other => Self::ExternalService(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_failure_class() {
        assert_eq!(PipelineError::validation("thought is required").status(), 400);
        assert_eq!(PipelineError::UnknownAttribute("bogus".into()).status(), 400);
        assert_eq!(PipelineError::InvalidArgument("k".into()).status(), 422);
        assert_eq!(PipelineError::DegenerateVector("blank".into()).status(), 422);
        assert_eq!(PipelineError::from(GenerationError::RateLimited).status(), 503);
        assert_eq!(
            PipelineError::from(GenerationError::Timeout { secs: 30 }).status(),
            503
        );
        assert_eq!(
            PipelineError::from(GenerationError::MalformedResponse("x".into())).status(),
            502
        );
        assert_eq!(
            PipelineError::from(GenerationError::Unauthorized { status: 401 }).status(),
            502
        );
        assert_eq!(PipelineError::Internal("x".into()).status(), 500);
    }

    #[test]
    fn vector_store_errors_keep_their_class() {
        let err: PipelineError = VectorStoreError::InvalidArgument("k must be in 1..=2".into()).into();
        assert_eq!(err.code(), "invalid_argument");
        let err: PipelineError = VectorStoreError::InvalidDimension {
            expected: 384,
            actual: 3,
        }
        .into();
        assert_eq!(err.code(), "internal_error");
    }

    #[test]
    fn unknown_attribute_is_a_client_error() {
        let err: PipelineError = GenerationError::UnknownAttribute("bogus".into()).into();
        assert_eq!(err.status(), 400);
        assert_eq!(err.to_string(), "Unknown attribute: bogus");
    }
}
