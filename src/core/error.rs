//! 단계별 오류와 파이프라인 치명 오류
//!
//! 분류/검색/생성 오류는 오케스트레이터가 잡아 caveat 이 붙은 답변으로 바꾼다.
//! 호출자에게 전달되는 것은 PipelineError 뿐이다.

use thiserror::Error;

use crate::index::IndexError;
use crate::llm::LlmError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassificationError {
    #[error("classification timed out")]
    Timeout,

    #[error("classifier LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("malformed classifier output: {0}")]
    Malformed(String),
}

impl ClassificationError {
    pub fn is_transport(&self) -> bool {
        match self {
            ClassificationError::Timeout => true,
            ClassificationError::Llm(e) => e.is_transport(),
            ClassificationError::Malformed(_) => false,
        }
    }
}

/// 인덱스에 도달하지 못한 경우만 오류 (결과 0건은 정상)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("retrieval timed out")]
    Timeout,

    #[error("vector index unavailable: {0}")]
    Index(#[from] IndexError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("synthesis timed out")]
    Timeout,

    #[error("answer LLM call failed: {0}")]
    Llm(#[from] LlmError),

    /// 형식 보정 재요청 후에도 요약 섹션을 찾지 못함
    #[error("answer could not be parsed after repair attempt: missing {0}")]
    Unparseable(String),
}

impl SynthesisError {
    pub fn is_transport(&self) -> bool {
        match self {
            SynthesisError::Timeout => true,
            SynthesisError::Llm(e) => e.is_transport(),
            SynthesisError::Unparseable(_) => false,
        }
    }
}

/// 호출자에게 전파되는 오류
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// 내부 계약 위반 (예: 후보에 없는 출처 인용)
    #[error("verification contract violated: {0}")]
    Verification(String),

    /// 인덱스와 LLM 모두 전송 계층에서 실패
    #[error("all collaborators unavailable: index ({index}), llm ({llm})")]
    CollaboratorsUnavailable { index: String, llm: String },

    #[error("pipeline run cancelled")]
    Cancelled,
}
