//! 문서 검색: 유사도 검색 + 메타데이터 필터 + 역할 분류
//!
//! 1. 인덱스에서 2*top_k 개 최근접 이웃 조회
//! 2. document_type_hint 가 있으면 문서 유형/출처로 필터 (전부 걸러지면 필터 생략)
//! 3. 유사도 내림차순 안정 정렬 후 top_k 로 절단
//! 4. RoleClassifier 로 template / example / reference 역할 부여

use std::sync::Arc;

use crate::config::RetrievalSection;
use crate::core::error::RetrievalError;
use crate::core::types::{Candidate, CandidateRole, CandidateSet, IntentDescriptor};
use crate::index::{IndexHit, VectorIndex};

/// 발췌 역할 분류 전략 (교체 가능)
pub trait RoleClassifier: Send + Sync {
    fn classify_role(&self, source_id: &str, excerpt: &str) -> CandidateRole;
}

/// 출처 이름과 발췌 앞부분의 표지어로 분류: 템플릿 표지어 → 예시 표지어 → 그 외 reference
#[derive(Debug, Clone)]
pub struct KeywordRoleClassifier {
    template_markers: Vec<String>,
    example_markers: Vec<String>,
    /// 발췌에서 표지어를 찾을 범위 (앞부분 글자 수)
    excerpt_head_chars: usize,
}

impl KeywordRoleClassifier {
    pub fn new(template_markers: Vec<String>, example_markers: Vec<String>) -> Self {
        Self {
            template_markers: lowercase_all(template_markers),
            example_markers: lowercase_all(example_markers),
            excerpt_head_chars: 80,
        }
    }

    pub fn from_config(config: &RetrievalSection) -> Self {
        Self::new(
            config.template_markers.clone(),
            config.example_markers.clone(),
        )
    }
}

impl Default for KeywordRoleClassifier {
    fn default() -> Self {
        Self::from_config(&RetrievalSection::default())
    }
}

impl RoleClassifier for KeywordRoleClassifier {
    fn classify_role(&self, source_id: &str, excerpt: &str) -> CandidateRole {
        let head: String = excerpt
            .chars()
            .take(self.excerpt_head_chars)
            .collect::<String>()
            .to_lowercase();
        let source = source_id.to_lowercase();
        let has = |markers: &[String]| {
            markers
                .iter()
                .any(|m| source.contains(m.as_str()) || head.contains(m.as_str()))
        };

        if has(&self.template_markers) {
            CandidateRole::Template
        } else if has(&self.example_markers) {
            CandidateRole::Example
        } else {
            CandidateRole::Reference
        }
    }
}

fn lowercase_all(markers: Vec<String>) -> Vec<String> {
    markers.into_iter().map(|m| m.to_lowercase()).collect()
}

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    role_classifier: Arc<dyn RoleClassifier>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, role_classifier: Arc<dyn RoleClassifier>) -> Self {
        Self {
            index,
            role_classifier,
        }
    }

    pub async fn retrieve(
        &self,
        descriptor: &IntentDescriptor,
        query_text: &str,
        top_k: usize,
    ) -> Result<CandidateSet, RetrievalError> {
        if top_k == 0 {
            return Ok(CandidateSet::empty());
        }
        let hits = self.index.query(query_text, top_k * 2).await?;
        let fetched = hits.len();

        let mut hits = apply_document_type_filter(hits, descriptor.document_type_hint.as_deref());
        for hit in &mut hits {
            hit.score = clamp_score(hit.score);
        }
        // sort_by 는 안정 정렬: 동점이면 인덱스가 돌려준 순서 유지
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);

        let candidates: Vec<Candidate> = hits
            .into_iter()
            .map(|hit| {
                let role = self.role_classifier.classify_role(&hit.document_id, &hit.excerpt);
                Candidate {
                    source_document_id: hit.document_id,
                    excerpt_text: hit.excerpt,
                    similarity_score: hit.score,
                    role,
                    metadata: hit.metadata,
                }
            })
            .collect();

        let set = CandidateSet::new(candidates);
        tracing::debug!(
            fetched,
            kept = set.len(),
            templates = set.count_role(CandidateRole::Template),
            examples = set.count_role(CandidateRole::Example),
            references = set.count_role(CandidateRole::Reference),
            "retrieval finished"
        );
        Ok(set)
    }
}

/// 문서 유형 힌트로 필터; 결과가 비면 원본 그대로 반환
fn apply_document_type_filter(hits: Vec<IndexHit>, hint: Option<&str>) -> Vec<IndexHit> {
    let Some(hint) = hint.map(|h| h.trim().to_lowercase()).filter(|h| !h.is_empty()) else {
        return hits;
    };
    let matches = |hit: &IndexHit| {
        hit.metadata
            .doc_type
            .as_deref()
            .map(|t| t.to_lowercase().contains(&hint))
            .unwrap_or(false)
            || hit.document_id.to_lowercase().contains(&hint)
    };
    if hits.iter().any(|h| matches(h)) {
        hits.into_iter().filter(|h| matches(h)).collect()
    } else {
        tracing::debug!("document type filter '{}' matched nothing, skipped", hint);
        hits
    }
}

fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
