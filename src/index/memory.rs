//! 메모리 상주 벡터 인덱스
//!
//! JSON 스냅샷(문서 id, 본문, 문서 유형, 수정일, 선택적 임베딩)을 읽어 벡터를 준비하고,
//! 이후에는 읽기 전용으로 코사인 유사도 검색만 수행한다.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::DocMetadata;
use crate::index::{IndexError, IndexHit, VectorIndex};
use crate::llm::Embedder;

/// 스냅샷 파일의 문서 한 건
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    /// 미리 계산된 임베딩; 없으면 로드 시 계산
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

struct Entry {
    document: IndexDocument,
    vector: Vec<f32>,
}

pub struct InMemoryIndex {
    entries: Vec<Entry>,
    embedder: Arc<dyn Embedder>,
}

impl InMemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            entries: Vec::new(),
            embedder,
        }
    }

    /// 문서 목록으로 인덱스 구성; 임베딩이 비어 있는 문서는 건너뜀
    pub async fn from_documents(
        embedder: Arc<dyn Embedder>,
        documents: Vec<IndexDocument>,
    ) -> Result<Self, IndexError> {
        let mut index = Self::new(embedder);
        for mut doc in documents {
            let vector = match doc.embedding.take() {
                Some(v) if !v.is_empty() => v,
                _ => index
                    .embedder
                    .embed(&doc.text)
                    .await
                    .map_err(|e| IndexError::Unavailable(e.to_string()))?,
            };
            if vector.is_empty() {
                tracing::debug!(document = %doc.id, "skipping document with empty embedding");
                continue;
            }
            index.entries.push(Entry {
                document: doc,
                vector,
            });
        }
        Ok(index)
    }

    /// JSON 스냅샷에서 로드; 파일이 없으면 빈 인덱스
    pub async fn load_snapshot(
        embedder: Arc<dyn Embedder>,
        path: &Path,
    ) -> Result<Self, IndexError> {
        if !path.exists() {
            tracing::warn!("index snapshot {} not found, starting empty", path.display());
            return Ok(Self::new(embedder));
        }
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| IndexError::Io(e.to_string()))?;
        let documents: Vec<IndexDocument> =
            serde_json::from_str(&data).map_err(|e| IndexError::Parse(e.to_string()))?;
        let index = Self::from_documents(embedder, documents).await?;
        tracing::info!("index loaded: {} documents from {}", index.len(), path.display());
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>, IndexError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &Entry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(&query, &entry.vector), entry))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| IndexHit {
                document_id: entry.document.id.clone(),
                excerpt: entry.document.text.clone(),
                score,
                metadata: DocMetadata {
                    last_modified: entry.document.last_modified,
                    doc_type: entry.document.doc_type.clone(),
                },
            })
            .collect())
    }
}

/// 코사인 유사도
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
