//! LLM 계층: 클라이언트 추상화와 구현 (OpenAI 호환 / Upstage / Mock), 임베딩

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod traits;
pub mod upstage;

pub use embedding::{create_embedder_from_config, Embedder, KeywordEmbedder, OpenAiEmbedder};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError, Message, Role};
pub use upstage::{create_upstage_client, SOLAR_MINI, SOLAR_PRO, UPSTAGE_BASE_URL};
