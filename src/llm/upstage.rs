//! Upstage Solar API 클라이언트 (OpenAI 호환 형식)
//!
//! - Base URL: https://api.upstage.ai/v1
//! - 모델: solar-pro (답변 생성), solar-1-mini-chat (질문 분류), solar-embedding-1-large (임베딩)

use crate::llm::OpenAiClient;

pub const UPSTAGE_BASE_URL: &str = "https://api.upstage.ai/v1";
pub const SOLAR_PRO: &str = "solar-pro";
pub const SOLAR_MINI: &str = "solar-1-mini-chat";

/// Upstage 클라이언트 생성
///
/// - 환경 변수 `UPSTAGE_API_KEY` 우선, 없으면 `OPENAI_API_KEY`
/// - 모델은 인자로 지정, 없으면 solar-pro
pub fn create_upstage_client(model: Option<&str>) -> OpenAiClient {
    let api_key = upstage_api_key().unwrap_or_else(|| "sk-placeholder".to_string());
    let model = model.unwrap_or(SOLAR_PRO);
    OpenAiClient::new(Some(UPSTAGE_BASE_URL), model, Some(api_key.as_str()))
}

pub fn upstage_api_key() -> Option<String> {
    std::env::var("UPSTAGE_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .filter(|k| !k.trim().is_empty())
}
