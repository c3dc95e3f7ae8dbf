//! 임베딩 API: 벡터 인덱스가 질의/문서를 벡터화할 때 사용
//!
//! - OpenAiEmbedder: OpenAI 호환 /embeddings 엔드포인트 (Upstage solar-embedding 포함)
//! - KeywordEmbedder: API 키 없이 동작하는 오프라인 임베더 (문자 바이그램 해시)

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::LlmError;

/// 텍스트를 벡터로 변환하는 제공자
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// async-openai 로 OpenAI 호환 embeddings API 호출
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| LlmError::Api(e.to_string()))?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(response
            .data
            .first()
            .map(|e| e.embedding.clone())
            .unwrap_or_default())
    }
}

/// 오프라인 임베더: 공백 제거 후 문자 바이그램을 고정 차원에 해시
///
/// 한국어처럼 띄어쓰기가 불규칙한 텍스트에서도 부분 일치를 잡아낸다.
#[derive(Debug, Clone)]
pub struct KeywordEmbedder {
    dims: usize,
}

impl KeywordEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let chars: Vec<char> = text
            .chars()
            .filter(|c| !c.is_whitespace() && !c.is_ascii_punctuation())
            .flat_map(char::to_lowercase)
            .collect();
        let mut vector = vec![0.0f32; self.dims];
        for pair in chars.windows(2) {
            let hash = pair
                .iter()
                .fold(0xcbf2_9ce4_8422_2325u64, |h, c| {
                    (h ^ *c as u64).wrapping_mul(0x0100_0000_01b3)
                });
            vector[(hash % self.dims as u64) as usize] += 1.0;
        }
        vector
    }
}

impl Default for KeywordEmbedder {
    fn default() -> Self {
        Self::new(512)
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(self.embed_text(text))
    }
}

/// 설정에서 임베더 생성: API 키가 있으면 원격, 없으면 KeywordEmbedder
pub fn create_embedder_from_config(
    provider: &str,
    base_url: Option<&str>,
    model: &str,
) -> Arc<dyn Embedder> {
    let key = match provider {
        "upstage" => crate::llm::upstage::upstage_api_key(),
        "openai" => std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
        _ => None,
    };
    match key {
        Some(key) => {
            let base = match provider {
                "upstage" => Some(base_url.unwrap_or(crate::llm::upstage::UPSTAGE_BASE_URL)),
                _ => base_url,
            };
            tracing::info!("Using remote embeddings ({})", model);
            Arc::new(OpenAiEmbedder::new(base, model, &key))
        }
        None => {
            tracing::debug!("no embedding API key, using keyword embedder");
            Arc::new(KeywordEmbedder::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_embedder_is_deterministic() {
        let embedder = KeywordEmbedder::new(64);
        assert_eq!(embedder.embed_text("출장신청서"), embedder.embed_text("출장 신청서"));
        assert_eq!(embedder.embed_text("").iter().sum::<f32>(), 0.0);
    }

    #[tokio::test]
    async fn test_keyword_embedder_counts_bigrams() {
        let embedder = KeywordEmbedder::new(1024);
        let v = embedder.embed("출장신청").await.unwrap();
        assert_eq!(v.iter().sum::<f32>(), 3.0);
    }
}
