//! 답변 검증: 최신성 / 완결성 / 의도 일치
//!
//! 순수 함수다. LLM 을 호출하지 않고 시계만 주입받는다 (verify_at).
//! staleness 는 재생성으로 고쳐지지 않으므로 재시도를 권하지 않는다.
//! 답변 길이(긴급 질문의 장황한 답변, 너무 짧은 답변)는 판정에 넣지 않고 warnings 로만 남긴다.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::config::VerificationSection;
use crate::core::types::{
    CandidateSet, Check, DraftAnswer, IntentCategory, IntentDescriptor, Urgency,
    VerificationVerdict,
};

pub struct Verifier {
    config: VerificationSection,
}

impl Verifier {
    pub fn from_config(config: &VerificationSection) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn verify(
        &self,
        draft: &DraftAnswer,
        candidates: &CandidateSet,
        descriptor: &IntentDescriptor,
        retries_left: u32,
    ) -> VerificationVerdict {
        self.verify_at(draft, candidates, descriptor, retries_left, Utc::now())
    }

    pub fn verify_at(
        &self,
        draft: &DraftAnswer,
        candidates: &CandidateSet,
        descriptor: &IntentDescriptor,
        retries_left: u32,
        now: DateTime<Utc>,
    ) -> VerificationVerdict {
        let mut failed = BTreeSet::new();
        if self.is_stale(draft, candidates, now) {
            failed.insert(Check::Staleness);
        }
        if is_incomplete(draft, candidates) {
            failed.insert(Check::Incompleteness);
        }
        if self.intent_mismatch(draft, descriptor) {
            failed.insert(Check::IntentMismatch);
        }

        let warnings = self.length_warnings(draft, descriptor, &failed);

        let retry_eligible = failed.iter().any(Check::is_retry_eligible);
        let verdict = VerificationVerdict {
            passed: failed.is_empty(),
            retry_recommended: retry_eligible && retries_left > 0,
            failed_checks: failed,
            warnings,
        };
        tracing::debug!(
            passed = verdict.passed,
            retry = verdict.retry_recommended,
            "verification: {:?}",
            verdict.failed_checks
        );
        verdict
    }

    /// 인용된 문서 중 하나라도 기준일보다 오래되었는지 (수정일 없는 문서는 제외)
    fn is_stale(&self, draft: &DraftAnswer, candidates: &CandidateSet, now: DateTime<Utc>) -> bool {
        let cutoff = now - Duration::days(self.config.staleness_days);
        draft
            .citations
            .iter()
            .filter_map(|id| candidates.get(id))
            .filter_map(|c| c.metadata.last_modified)
            .any(|modified| modified < cutoff)
    }

    fn length_warnings(
        &self,
        draft: &DraftAnswer,
        descriptor: &IntentDescriptor,
        failed: &BTreeSet<Check>,
    ) -> Vec<String> {
        if draft.no_reference {
            return Vec::new();
        }
        let chars = draft.full_text().chars().count();
        let mut warnings = Vec::new();
        if descriptor.urgency == Urgency::High && chars > self.config.urgent_max_chars {
            warnings.push(format!(
                "긴급 질문이지만 답변이 깁니다 ({}자). 요약과 첫 단계부터 확인하세요.",
                chars
            ));
        }
        // 형식이 깨진 답변은 incompleteness 로 이미 안내됨
        if !failed.contains(&Check::Incompleteness) && chars < self.config.min_answer_chars {
            warnings.push(format!(
                "답변이 짧습니다 ({}자). 세부 내용은 참고 문서를 직접 확인하세요.",
                chars
            ));
        }
        warnings
    }

    fn intent_mismatch(&self, draft: &DraftAnswer, descriptor: &IntentDescriptor) -> bool {
        if draft.no_reference {
            return false;
        }
        let keywords = match descriptor.category {
            IntentCategory::TemplateLookup => &self.config.template_keywords,
            IntentCategory::ProcessGuidance => &self.config.process_keywords,
            IntentCategory::ContactLookup => &self.config.contact_keywords,
            IntentCategory::General => return false,
        };
        if keywords.is_empty() {
            return false;
        }
        let text = draft.full_text().to_lowercase();
        !keywords.iter().any(|k| text.contains(&k.to_lowercase()))
    }
}

fn is_incomplete(draft: &DraftAnswer, candidates: &CandidateSet) -> bool {
    draft.summary.trim().is_empty()
        || draft.detail.is_empty()
        || draft.tips.is_empty()
        || (draft.citations.is_empty() && !candidates.is_empty())
}
