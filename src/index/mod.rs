//! 벡터 인덱스 협력자
//!
//! 파이프라인은 VectorIndex::query 만 호출하며 인덱스를 변경하지 않는다.
//! 인덱스 구축(문서 적재)은 이 크레이트 밖의 책임이다.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::DocMetadata;

pub use memory::{IndexDocument, InMemoryIndex};

/// 최근접 이웃 검색 결과 한 건 (인덱스가 반환한 순서 유지)
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub document_id: String,
    pub excerpt: String,
    pub score: f32,
    pub metadata: DocMetadata,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("index unavailable: {0}")]
    Unavailable(String),

    #[error("index snapshot read failed: {0}")]
    Io(String),

    #[error("index snapshot parse failed: {0}")]
    Parse(String),
}

/// 읽기 전용 최근접 검색 (여러 실행이 동시에 호출)
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 코사인 유사도 기준 상위 k 개, 점수 내림차순
    async fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>, IndexError>;
}
