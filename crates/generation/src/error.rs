use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenerationError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generation service timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Generation service rate limited the request")]
    RateLimited,

    #[error("Generation service returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Generation service rejected the credential (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),
}

impl GenerationError {
    /// Failures worth retrying: timeouts, 429, 5xx and connection-level errors.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimited | Self::Transport(_) => true,
            Self::Upstream { status, .. } => *status >= 500,
            Self::Unauthorized { .. }
            | Self::MalformedResponse(_)
            | Self::UnknownAttribute(_)
            | Self::MissingCredential(_) => false,
        }
    }
}
