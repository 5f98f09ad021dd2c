use clap::ValueEnum;
use reframe_vector_store::EmbeddingMode;

#[derive(Copy, Clone, ValueEnum)]
pub(crate) enum EmbedMode {
    Onnx,
    Stub,
}

impl EmbedMode {
    pub(crate) const fn as_domain(self) -> EmbeddingMode {
        match self {
            EmbedMode::Onnx => EmbeddingMode::Onnx,
            EmbedMode::Stub => EmbeddingMode::Stub,
        }
    }
}
