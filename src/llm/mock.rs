//! Mock LLM 클라이언트 (테스트/오프라인용, API 불필요)
//!
//! 시스템 프롬프트를 보고 두 가지 요청을 구분한다:
//! - 질문 분류: 키워드 규칙으로 의도 JSON 을 반환
//! - 답변 생성: 프롬프트에 번호가 매겨진 참고 문서를 모두 인용하는 정형 답변을 반환

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::agents::intent::CLASSIFIER_PROMPT_MARKER;
use crate::llm::{LlmClient, LlmError, Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient;

impl MockLlmClient {
    fn classify(question: &str) -> String {
        let intent = if ["양식", "템플릿", "서식"].iter().any(|k| question.contains(k)) {
            "템플릿_찾기"
        } else if ["담당자", "연락처", "내선"].iter().any(|k| question.contains(k)) {
            "담당자_찾기"
        } else if ["절차", "순서", "어떻게", "방법"].iter().any(|k| question.contains(k)) {
            "프로세스_안내"
        } else {
            "일반_질문"
        };
        let urgency = if ["급해", "빨리", "긴급", "당장"].iter().any(|k| question.contains(k)) {
            "높음"
        } else {
            "보통"
        };
        let document_type = question
            .split_whitespace()
            .find(|w| w.contains("서") || w.contains("보고"))
            .map(|w| {
                let w: String = w.chars().take_while(|c| c.is_alphanumeric()).collect();
                format!("\"{}\"", w)
            })
            .unwrap_or_else(|| "null".to_string());
        format!(
            "{{\"intent\": \"{}\", \"document_type\": {}, \"urgency\": \"{}\"}}",
            intent, document_type, urgency
        )
    }

    fn answer(prompt: &str) -> String {
        static REF: OnceLock<Regex> = OnceLock::new();
        let re = REF.get_or_init(|| Regex::new(r"(?m)^\[(\d+)\] 출처:").expect("valid regex"));
        let refs: Vec<String> = re
            .captures_iter(prompt)
            .map(|c| format!("[{}]", &c[1]))
            .collect();
        let cite = refs.first().cloned().unwrap_or_default();
        format!(
            "📌 요약:\n참고 문서 {cite} 의 양식과 절차를 따라 작성합니다.\n\n\
             📝 상세 설명:\n1. {cite} 양식 파일을 내려받습니다.\n2. 절차 순서에 따라 항목을 채웁니다.\n3. 담당 부서에 제출합니다.\n\n\
             💡 작성 팁 및 주의사항:\n- 제출 전 담당자 연락처를 확인하세요.\n- 최신 양식인지 확인하세요.\n\n\
             📚 출처: {}",
            refs.join(", ")
        )
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        if system.contains(CLASSIFIER_PROMPT_MARKER) {
            Ok(Self::classify(last_user))
        } else {
            Ok(Self::answer(last_user))
        }
    }
}
