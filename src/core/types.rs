//! 실행 단위 값 객체
//!
//! Question → IntentDescriptor → CandidateSet → DraftAnswer → VerifiedAnswer.
//! 각 단계는 앞 단계의 값을 참조로 받아 새 값을 만들며, 제자리 수정은 없다.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 사용자 질문 (실행 하나가 소유, 불변)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub asked_at: DateTime<Utc>,
}

impl Question {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into().trim().to_string(),
            asked_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    /// 양식/템플릿 파일 자체를 요청
    TemplateLookup,
    /// 업무 순서나 절차 안내
    ProcessGuidance,
    /// 담당자/연락처 요청
    ContactLookup,
    General,
}

impl IntentCategory {
    pub fn label(&self) -> &'static str {
        match self {
            IntentCategory::TemplateLookup => "템플릿_찾기",
            IntentCategory::ProcessGuidance => "프로세스_안내",
            IntentCategory::ContactLookup => "담당자_찾기",
            IntentCategory::General => "일반_질문",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    Normal,
}

impl Urgency {
    pub fn label(&self) -> &'static str {
        match self {
            Urgency::High => "높음",
            Urgency::Normal => "보통",
        }
    }
}

/// 질문 분류 결과 (한 번 만들어진 뒤 읽기 전용)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentDescriptor {
    pub category: IntentCategory,
    pub urgency: Urgency,
    pub document_type_hint: Option<String>,
}

impl IntentDescriptor {
    /// 분류 실패 시 사용하는 기본값
    pub fn fallback() -> Self {
        Self {
            category: IntentCategory::General,
            urgency: Urgency::Normal,
            document_type_hint: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateRole {
    Template,
    Example,
    Reference,
}

impl CandidateRole {
    pub fn label(&self) -> &'static str {
        match self {
            CandidateRole::Template => "템플릿 문서",
            CandidateRole::Example => "작성 예시",
            CandidateRole::Reference => "관련 문서",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    pub last_modified: Option<DateTime<Utc>>,
    pub doc_type: Option<String>,
}

/// 검색된 발췌 하나와 그 역할
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub source_document_id: String,
    pub excerpt_text: String,
    /// [0, 1] 로 클램프된 유사도
    pub similarity_score: f32,
    pub role: CandidateRole,
    pub metadata: DocMetadata,
}

/// 유사도 내림차순으로 정렬된 후보 집합, 역할은 한 번만 부여됨
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
}

impl CandidateSet {
    /// candidates 는 이미 정렬/절단된 상태여야 한다 (Retriever 가 보장)
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.candidates
            .iter()
            .map(|c| c.source_document_id.as_str())
            .collect()
    }

    pub fn contains_source(&self, id: &str) -> bool {
        self.candidates.iter().any(|c| c.source_document_id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.source_document_id == id)
    }

    pub fn by_role(&self, role: CandidateRole) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(move |c| c.role == role)
    }

    pub fn count_role(&self, role: CandidateRole) -> usize {
        self.by_role(role).count()
    }
}

/// 검증 전 답변
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftAnswer {
    pub summary: String,
    /// 순서 있는 단계
    pub detail: Vec<String>,
    /// 중복 없는 팁 (입력 순서 유지)
    pub tips: Vec<String>,
    pub citations: Vec<String>,
    pub confidence: f32,
    /// 참고 문서 없이 만들어진 답변 표시
    pub no_reference: bool,
    /// 모델 원문 (없으면 빈 문자열)
    pub raw: String,
}

impl DraftAnswer {
    /// 답변 전체 텍스트 (의도 신호어 검사용)
    pub fn full_text(&self) -> String {
        let mut text = self.summary.clone();
        for step in &self.detail {
            text.push('\n');
            text.push_str(step);
        }
        for tip in &self.tips {
            text.push('\n');
            text.push_str(tip);
        }
        text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Staleness,
    Incompleteness,
    IntentMismatch,
}

impl Check {
    /// 재생성으로 해결될 수 있는 검사인지 (staleness 는 안내만)
    pub fn is_retry_eligible(&self) -> bool {
        !matches!(self, Check::Staleness)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Check::Staleness => "일부 참고 문서가 오래되었습니다 (staleness). 최신 규정을 확인하세요.",
            Check::Incompleteness => "답변 형식이 완전하지 않습니다 (incompleteness). 요약/상세 설명/팁 또는 출처가 누락되었습니다.",
            Check::IntentMismatch => "답변이 질문 의도와 충분히 일치하지 않을 수 있습니다 (intent_mismatch).",
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Check::Staleness => "staleness",
            Check::Incompleteness => "incompleteness",
            Check::IntentMismatch => "intent_mismatch",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub passed: bool,
    pub failed_checks: BTreeSet<Check>,
    pub retry_recommended: bool,
    /// 통과/재시도 판정에 쓰지 않는 안내 (답변 길이 등)
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl VerificationVerdict {
    pub fn has_retry_eligible_failure(&self) -> bool {
        self.failed_checks.iter().any(Check::is_retry_eligible)
    }

    /// incompleteness 가 재시도 대상 실패의 전부인지
    pub fn only_incomplete(&self) -> bool {
        self.failed_checks.contains(&Check::Incompleteness)
            && !self.failed_checks.contains(&Check::IntentMismatch)
    }
}

/// 최종 답변: 영속화 싱크로 넘어가는 종단 값
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedAnswer {
    pub draft: DraftAnswer,
    pub verdict: VerificationVerdict,
    /// 깨끗하게 통과했으면 빈 문자열
    pub caveat: String,
}

impl VerifiedAnswer {
    pub fn is_clean(&self) -> bool {
        self.verdict.passed && self.caveat.is_empty()
    }
}
