//! LLM 클라이언트 추상화
//!
//! 모든 백엔드(OpenAI 호환 / Upstage / Mock)는 LlmClient 를 구현한다.
//! 파이프라인은 `Arc<dyn LlmClient>` 를 여러 실행이 읽기 전용으로 공유한다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 메시지 역할 (LLM API 와 동일)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 단일 메시지
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// LLM 호출 실패
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("LLM request timed out")]
    Timeout,

    /// 연결 실패 등 전송 계층 오류
    #[error("LLM transport error: {0}")]
    Transport(String),

    #[error("LLM API error: {0}")]
    Api(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,
}

impl LlmError {
    /// 모델 자체에 도달하지 못한 경우 (타임아웃 포함)
    pub fn is_transport(&self) -> bool {
        matches!(self, LlmError::Timeout | LlmError::Transport(_))
    }
}

/// LLM 클라이언트: 비스트리밍 완성
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 누적 토큰 사용량: (prompt_tokens, completion_tokens, total_tokens)
    /// 기본값 (0, 0, 0), 구현체가 덮어쓸 수 있음
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
