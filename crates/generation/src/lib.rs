//! Generation layer: prompt assembly and the chat-completion gateway.
//!
//! ```text
//! GenerationGateway
//!   ├─ classify  ─ 5 fixed exemplars + query        (max_tokens 50,  top_p 0.6)
//!   ├─ generate  ─ shuffled retrieved examples + query (max_tokens 256, top_p 0.6)
//!   └─ rewrite   ─ attribute-specific instruction      (max_tokens 256, top_p 0.6)
//!          │
//!          └─> RetryPolicy ─> dyn CompletionBackend (OpenAI-compatible HTTP)
//! ```

mod attribute;
mod backend;
mod error;
mod gateway;
mod prompts;
mod retry;

pub use attribute::ControlAttribute;
pub use backend::{
    ChatMessage, CompletionBackend, CompletionRequest, OpenAiBackend, OpenAiConfig,
    SamplingParams, DEFAULT_API_BASE, DEFAULT_CHAT_MODEL,
};
pub use error::{GenerationError, Result};
pub use gateway::GenerationGateway;
pub use prompts::{PromptAssembler, CLASSIFY_SYSTEM, GENERATE_SYSTEM};
pub use retry::RetryPolicy;
