//! 질문 분석: 의도 / 긴급도 / 문서 유형 분류
//!
//! LLM 한 번 호출로 JSON 을 받고, 경계에서 정규화한다.
//! 한국어 라벨(템플릿_찾기 등)과 영문 라벨(template_lookup 등)을 모두 받아들이며,
//! 누락된 긴급도는 normal, 알 수 없는 의도는 general 로 처리한다.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;

use crate::core::error::ClassificationError;
use crate::core::types::{IntentCategory, IntentDescriptor, Question, Urgency};
use crate::llm::{LlmClient, Message};

/// 분류 프롬프트 식별용 문구 (MockLlmClient 가 요청 종류를 구분할 때 사용)
pub const CLASSIFIER_PROMPT_MARKER: &str = "질문 분석 및 라우팅 전문가";

/// 분류기 출력 형식 (Schema 생성 및 역직렬화용)
#[derive(Debug, Default, Deserialize, JsonSchema)]
struct ClassifierOutput {
    /// 템플릿_찾기 / 프로세스_안내 / 담당자_찾기 / 일반_질문
    #[serde(default)]
    intent: Option<String>,
    /// 문서 유형 (예: 출장신청서, 보고서) 또는 null
    #[serde(default)]
    document_type: Option<String>,
    /// 높음 / 보통
    #[serde(default)]
    urgency: Option<String>,
}

fn classifier_schema_json() -> String {
    let schema = schema_for!(ClassifierOutput);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

fn system_prompt() -> String {
    format!(
        r#"당신은 공공기관의 {marker}입니다.
주어진 질문을 분석하여 다음 4가지 의도 중 하나로 분류하고,
필요한 메타데이터(문서유형, 긴급도)를 JSON 형식으로 정확하게 추출하세요.

# 의도 분류 기준
1. 템플릿_찾기: 특정 양식이나 템플릿 파일 자체를 요청하는 경우. (예: "OOO 신청서 양식 줘", "최신 보고서 템플릿")
2. 프로세스_안내: 어떤 업무를 처음 할 때의 '순서'나 '절차'를 요청하는 경우. (예: "A 업무 처음인데 순서가?", "장비 구매 절차")
3. 담당자_찾기: 특정 업무나 문서의 담당자/연락처를 요청하는 경우. (예: "예산 담당자 누구야?", "인사팀 내선번호")
4. 일반_질문: 위의 세 가지에 해당하지 않는 단순 정보 요청이나 작성 팁 요청.

# 긴급도 기준
- 높음: '급해요', '빨리', '긴급', '당장' 등의 키워드가 포함된 경우.
- 보통: 일반적인 요청.

# 출력 형식 (반드시 JSON만 출력, 아래 스키마 준수)
{schema}

주의: 다른 텍스트 없이 JSON만 출력하세요."#,
        marker = CLASSIFIER_PROMPT_MARKER,
        schema = classifier_schema_json(),
    )
}

/// 질문 분류기: LLM 호출 1회, 그 외 부수 효과 없음
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt(),
        }
    }

    pub async fn classify(&self, question: &Question) -> Result<IntentDescriptor, ClassificationError> {
        let messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(format!("질문: {}", question.text)),
        ];
        let response = self.llm.complete(&messages).await?;
        parse_descriptor(&response)
    }
}

/// 모델 응답에서 IntentDescriptor 추출 및 정규화
pub fn parse_descriptor(response: &str) -> Result<IntentDescriptor, ClassificationError> {
    let json = extract_json(response)
        .ok_or_else(|| ClassificationError::Malformed(preview(response)))?;
    let raw: ClassifierOutput = serde_json::from_str(json)
        .map_err(|e| ClassificationError::Malformed(format!("{}: {}", e, preview(json))))?;

    Ok(IntentDescriptor {
        category: normalize_category(raw.intent.as_deref()),
        urgency: normalize_urgency(raw.urgency.as_deref()),
        document_type_hint: normalize_document_type(raw.document_type),
    })
}

/// 코드 블록 안의 JSON 우선, 없으면 첫 번째 JSON 객체 (한 단계 중첩 허용)
fn extract_json(text: &str) -> Option<&str> {
    static FENCED: OnceLock<Regex> = OnceLock::new();
    static BARE: OnceLock<Regex> = OnceLock::new();
    let fenced = FENCED.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex")
    });
    if let Some(m) = fenced.captures(text).and_then(|c| c.get(1)) {
        return Some(m.as_str());
    }
    let bare = BARE.get_or_init(|| {
        Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("valid regex")
    });
    bare.find(text).map(|m| m.as_str())
}

fn normalize_category(raw: Option<&str>) -> IntentCategory {
    let Some(raw) = raw else {
        return IntentCategory::General;
    };
    let key: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .collect();
    match key.as_str() {
        "템플릿찾기" | "templatelookup" | "template" => IntentCategory::TemplateLookup,
        "프로세스안내" | "processguidance" | "process" => IntentCategory::ProcessGuidance,
        "담당자찾기" | "contactlookup" | "contact" => IntentCategory::ContactLookup,
        _ => IntentCategory::General,
    }
}

fn normalize_urgency(raw: Option<&str>) -> Urgency {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("높음") | Some("high") | Some("긴급") | Some("urgent") => Urgency::High,
        _ => Urgency::Normal,
    }
}

fn normalize_document_type(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| {
        !s.is_empty()
            && !matches!(
                s.to_lowercase().as_str(),
                "null" | "none" | "없음" | "알 수 없음" | "n/a"
            )
    })
}

fn preview(text: &str) -> String {
    if text.chars().count() > 120 {
        format!("{}...", text.chars().take(120).collect::<String>())
    } else {
        text.to_string()
    }
}
