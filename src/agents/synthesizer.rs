//! 답변 생성: 후보 문서를 근거로 요약 / 상세 설명 / 팁 / 출처를 생성
//!
//! - 후보(검색 단계에서 이미 top_k 로 자른 집합)를 모두 프롬프트에 넣고, 역할별로 묶어 [n] 번호를 붙인다.
//!   재검색으로 top_k 가 넓어지면 프롬프트도 그만큼 넓어진다.
//! - 모델 출력은 섹션 표지(📌 📝 💡 📚)로 파싱한다. 섹션이 빠지면 더 엄격한 형식 지시로 한 번 재요청한다.
//! - 인용은 [n] 표기와 📚 출처 섹션에 적힌 문서 이름에서 추출하며, 프롬프트에 넣은 후보 밖의 출처는 버린다.

use std::cmp::Reverse;
use std::ops::Range;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::config::SynthesisSection;
use crate::core::error::SynthesisError;
use crate::core::types::{
    Candidate, CandidateRole, CandidateSet, DraftAnswer, IntentDescriptor, Question, Urgency,
};
use crate::llm::{LlmClient, Message};

/// 참고 문서 없이 만들어진 답변에 들어가는 표지
pub const NO_REFERENCE_MARKER: &str = "no reference found";

const SYSTEM_PROMPT: &str = r#"당신은 공공기관 업무 지원 AI 어시스턴트입니다.
주어진 문서를 바탕으로 질문에 정확하고 친절하게 답변해주세요.

# 답변 형식
반드시 다음 형식으로 답변하세요:

📌 요약:
(한 줄로 핵심 답변)

📝 상세 설명:
(단계별 설명, 한 줄에 한 단계)

💡 작성 팁 및 주의사항:
(실무에 도움되는 팁, 한 줄에 하나)

📚 출처:
(참고한 문서 번호, 예: [1], [3])

# 답변 작성 가이드
1. 요약은 한 문장으로 명확하게
2. 상세 설명은 2-5개 항목으로 구조화
3. 팁은 실무에서 바로 적용 가능한 것으로
4. 전문 용어는 쉽게 풀어서 설명
5. 참고 문서에 없는 내용은 지어내지 말 것"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Summary,
    Detail,
    Tips,
    Sources,
}

impl Section {
    fn label(&self) -> &'static str {
        match self {
            Section::Summary => "📌 요약",
            Section::Detail => "📝 상세 설명",
            Section::Tips => "💡 작성 팁 및 주의사항",
            Section::Sources => "📚 출처",
        }
    }
}

/// 섹션별로 나눈 모델 출력
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedAnswer {
    pub summary: String,
    pub detail: Vec<String>,
    pub tips: Vec<String>,
}

/// 필수 섹션 누락: 파싱된 부분과 빠진 섹션
#[derive(Debug, Clone, PartialEq)]
pub struct SectionParseError {
    pub partial: ParsedAnswer,
    pub missing: Vec<Section>,
}

impl SectionParseError {
    fn missing_labels(&self) -> String {
        self.missing
            .iter()
            .map(Section::label)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// 섹션 표지로 모델 출력을 분해; summary / detail / tips 중 하나라도 비면 Err
pub fn parse_sections(raw: &str) -> Result<ParsedAnswer, SectionParseError> {
    let mut parsed = ParsedAnswer::default();
    let mut summary_lines: Vec<String> = Vec::new();
    let mut current: Option<Section> = None;

    for line in raw.lines() {
        if let Some((section, rest)) = section_header(line) {
            current = Some(section);
            if !rest.is_empty() {
                push_line(section, rest, &mut summary_lines, &mut parsed);
            }
            continue;
        }
        if let Some(section) = current {
            let line = line.trim();
            if !line.is_empty() {
                push_line(section, line, &mut summary_lines, &mut parsed);
            }
        }
    }
    parsed.summary = summary_lines.join(" ");

    let mut missing = Vec::new();
    if parsed.summary.is_empty() {
        missing.push(Section::Summary);
    }
    if parsed.detail.is_empty() {
        missing.push(Section::Detail);
    }
    if parsed.tips.is_empty() {
        missing.push(Section::Tips);
    }
    if missing.is_empty() {
        Ok(parsed)
    } else {
        Err(SectionParseError {
            partial: parsed,
            missing,
        })
    }
}

fn push_line(section: Section, line: &str, summary: &mut Vec<String>, parsed: &mut ParsedAnswer) {
    match section {
        Section::Summary => summary.push(line.to_string()),
        Section::Detail => {
            let step = strip_list_prefix(line);
            if !step.is_empty() {
                parsed.detail.push(step.to_string());
            }
        }
        Section::Tips => {
            let tip = strip_list_prefix(line);
            if !tip.is_empty() && !parsed.tips.iter().any(|t| t == tip) {
                parsed.tips.push(tip.to_string());
            }
        }
        Section::Sources => {}
    }
}

/// 섹션 제목 줄이면 (섹션, 제목 뒤에 이어진 내용)
fn section_header(line: &str) -> Option<(Section, &str)> {
    let trimmed = line
        .trim()
        .trim_start_matches(|c: char| c == '#' || c == '*' || c.is_whitespace());
    let emoji = [
        ("📌", Section::Summary),
        ("📝", Section::Detail),
        ("💡", Section::Tips),
        ("📚", Section::Sources),
    ];
    for (marker, section) in emoji {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return Some((section, strip_heading_label(rest)));
        }
    }
    let words = [
        ("요약", Section::Summary),
        ("상세 설명", Section::Detail),
        ("상세설명", Section::Detail),
        ("작성 팁 및 주의사항", Section::Tips),
        ("작성 팁", Section::Tips),
        ("팁 및 주의사항", Section::Tips),
        ("출처", Section::Sources),
    ];
    for (word, section) in words {
        if let Some(rest) = trimmed.strip_prefix(word) {
            let rest = rest.trim_start_matches(|c: char| c == '*' || c.is_whitespace());
            if rest.is_empty() {
                return Some((section, ""));
            }
            if rest.starts_with(':') || rest.starts_with('：') {
                return Some((section, strip_heading_label(rest)));
            }
        }
    }
    None
}

/// 긴 것부터: "작성 팁" 이 "작성 팁 및 주의사항" 의 앞부분만 떼지 않도록
const HEADING_LABELS: [&str; 7] = [
    "작성 팁 및 주의사항",
    "팁 및 주의사항",
    "작성 팁",
    "상세 설명",
    "상세설명",
    "요약",
    "출처",
];

/// "요약: 내용" / " 작성 팁 및 주의사항:" 에서 제목 부분을 떼어냄; 알려진 제목이 아니면 전부 내용
fn strip_heading_label(rest: &str) -> &str {
    let rest = rest.trim().trim_start_matches('*').trim_start();
    let body = HEADING_LABELS
        .iter()
        .find_map(|label| rest.strip_prefix(*label))
        .map(|r| r.trim_start_matches(|c: char| c == '*' || c.is_whitespace()))
        .filter(|r| r.is_empty() || r.starts_with([':', '：']))
        .unwrap_or(rest);
    body.strip_prefix([':', '：'])
        .unwrap_or(body)
        .trim()
        .trim_matches('*')
        .trim()
}

/// 📚 출처 섹션의 본문 (제목 줄에 이어 쓴 내용 포함)
fn sources_section(raw: &str) -> String {
    let mut lines = Vec::new();
    let mut inside = false;
    for line in raw.lines() {
        if let Some((section, rest)) = section_header(line) {
            inside = section == Section::Sources;
            if inside && !rest.is_empty() {
                lines.push(rest);
            }
            continue;
        }
        if inside {
            lines.push(line.trim());
        }
    }
    lines.join("\n")
}

/// text[start..end] 가 더 긴 파일명/토큰의 일부가 아닌지
fn is_token_boundary(text: &str, start: usize, end: usize) -> bool {
    let joins = |c: char| c.is_alphanumeric() || c == '_' || c == '-';
    let joined_before = text[..start]
        .chars()
        .next_back()
        .is_some_and(|c| joins(c) || c == '.');
    let mut after = text[end..].chars();
    let joined_after = match after.next() {
        Some('.') => after.next().is_some_and(joins),
        Some(c) => joins(c),
        None => false,
    };
    !joined_before && !joined_after
}

fn strip_list_prefix(line: &str) -> &str {
    let line = line.trim();
    let line = line.trim_start_matches(['-', '•', '*', '·']).trim_start();
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let after = &line[digits..];
        if let Some(rest) = after.strip_prefix('.').or_else(|| after.strip_prefix(')')) {
            return rest.trim();
        }
    }
    line
}

/// 프롬프트에 들어간 후보와 그 번호
struct Context<'a> {
    numbered: Vec<(usize, &'a Candidate)>,
}

impl<'a> Context<'a> {
    /// 후보 전체를 역할 순(템플릿 → 예시 → 관련)으로 번호 매김
    fn build(candidates: &'a CandidateSet) -> Self {
        let mut numbered = Vec::with_capacity(candidates.len());
        for role in [
            CandidateRole::Template,
            CandidateRole::Example,
            CandidateRole::Reference,
        ] {
            for c in candidates.by_role(role) {
                numbered.push((numbered.len() + 1, c));
            }
        }
        Self { numbered }
    }

    fn render_role(&self, role: CandidateRole, max_chars: usize) -> String {
        let blocks: Vec<String> = self
            .numbered
            .iter()
            .filter(|(_, c)| c.role == role)
            .map(|(n, c)| {
                format!(
                    "[{}] 출처: {}\n내용: {}\n",
                    n,
                    c.source_document_id,
                    truncate_chars(&c.excerpt_text, max_chars)
                )
            })
            .collect();
        if blocks.is_empty() {
            "없음".to_string()
        } else {
            blocks.join("\n")
        }
    }

    /// 응답에서 인용을 찾아 후보 id 로 변환 (등장 순서, 중복 제거)
    fn citations(&self, raw: &str) -> Vec<String> {
        static CITE: OnceLock<Regex> = OnceLock::new();
        let re = CITE.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("valid regex"));

        let mut cited: Vec<String> = Vec::new();
        let mut push = |id: &str| {
            if !cited.iter().any(|c| c == id) {
                cited.push(id.to_string());
            }
        };
        for cap in re.captures_iter(raw) {
            let Ok(n) = cap[1].parse::<usize>() else {
                continue;
            };
            if let Some((_, c)) = self.numbered.iter().find(|(i, _)| *i == n) {
                push(&c.source_document_id);
            }
        }

        // 긴 id 가 먼저 자리를 차지해야 "출장_규정.pdf" 안의 "규정.pdf" 가 따로 잡히지 않음
        let sources = sources_section(raw);
        let mut by_len: Vec<&str> = self
            .numbered
            .iter()
            .map(|(_, c)| c.source_document_id.as_str())
            .filter(|id| !id.is_empty())
            .collect();
        by_len.sort_by_key(|id| Reverse(id.len()));

        let mut claimed: Vec<Range<usize>> = Vec::new();
        let mut named: Vec<(usize, &str)> = Vec::new();
        for id in by_len {
            for (start, _) in sources.match_indices(id) {
                let end = start + id.len();
                let overlaps = claimed.iter().any(|r| start < r.end && r.start < end);
                if overlaps || !is_token_boundary(&sources, start, end) {
                    continue;
                }
                claimed.push(start..end);
                named.push((start, id));
            }
        }
        named.sort_by_key(|(pos, _)| *pos);
        for (_, id) in named {
            push(id);
        }
        cited
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmClient>,
    config: SynthesisSection,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, config: SynthesisSection) -> Self {
        Self { llm, config }
    }

    pub async fn synthesize(
        &self,
        descriptor: &IntentDescriptor,
        question: &Question,
        candidates: &CandidateSet,
    ) -> Result<DraftAnswer, SynthesisError> {
        if candidates.is_empty() {
            return Ok(no_reference_answer());
        }

        let context = Context::build(candidates);
        let mut messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(self.user_prompt(descriptor, question, &context)),
        ];

        let raw = self.llm.complete(&messages).await?;
        let (raw, parsed) = match parse_sections(&raw) {
            Ok(parsed) => (raw, parsed),
            Err(err) => {
                tracing::warn!("answer missing sections ({}), re-prompting", err.missing_labels());
                messages.push(Message::assistant(raw));
                messages.push(Message::user(repair_prompt(&err)));
                let repaired = self.llm.complete(&messages).await?;
                match parse_sections(&repaired) {
                    Ok(parsed) => (repaired, parsed),
                    Err(err) if err.missing.contains(&Section::Summary) => {
                        return Err(SynthesisError::Unparseable(err.missing_labels()));
                    }
                    // 요약은 있으나 상세/팁이 빠진 답변은 그대로 넘겨 검증 단계에서 판정
                    Err(err) => (repaired, err.partial),
                }
            }
        };

        let citations = context.citations(&raw);
        let confidence = citations.len() as f32 / candidates.len() as f32;
        Ok(DraftAnswer {
            summary: parsed.summary,
            detail: parsed.detail,
            tips: parsed.tips,
            citations,
            confidence: confidence.clamp(0.0, 1.0),
            no_reference: false,
            raw,
        })
    }

    fn user_prompt(&self, descriptor: &IntentDescriptor, question: &Question, context: &Context<'_>) -> String {
        let max = self.config.max_excerpt_chars;
        let mut prompt = format!(
            "질문: {}\n\n의도: {}\n문서 유형: {}\n긴급도: {}\n\n참고 문서:\n\n[템플릿 문서]\n{}\n\n[작성 예시]\n{}\n\n[관련 문서]\n{}\n\n",
            question.text,
            descriptor.category.label(),
            descriptor.document_type_hint.as_deref().unwrap_or("알 수 없음"),
            descriptor.urgency.label(),
            context.render_role(CandidateRole::Template, max),
            context.render_role(CandidateRole::Example, max),
            context.render_role(CandidateRole::Reference, max),
        );
        if descriptor.urgency == Urgency::High {
            prompt.push_str("긴급도가 '높음'이므로 가장 간소화된 처리 방법을 요약과 상세 설명의 첫 단계에 먼저 안내하세요.\n");
        }
        prompt.push_str("위 형식에 맞춰 답변을 생성하세요.");
        prompt
    }
}

fn repair_prompt(err: &SectionParseError) -> String {
    format!(
        "이전 답변에 필수 섹션({})이 없습니다. 다른 설명 없이 아래 네 섹션을 모두, 이 순서대로 포함해 다시 작성하세요.\n\n\
         📌 요약:\n(한 문장)\n\n📝 상세 설명:\n1. (단계)\n2. (단계)\n\n💡 작성 팁 및 주의사항:\n- (팁)\n\n📚 출처:\n[번호]",
        err.missing_labels()
    )
}

/// 후보가 없을 때의 답변: 모델을 호출하지 않음
fn no_reference_answer() -> DraftAnswer {
    DraftAnswer {
        summary: format!("관련 참고 문서를 찾지 못했습니다 ({}).", NO_REFERENCE_MARKER),
        detail: vec![
            "질문과 관련된 과거 인수인계 문서가 인덱스에 없습니다.".to_string(),
            "질문을 더 구체적으로 바꾸거나 담당 부서에 직접 문의하세요.".to_string(),
        ],
        tips: vec!["문서 이름이나 업무명을 포함해 다시 질문해 보세요.".to_string()],
        citations: Vec::new(),
        confidence: 0.0,
        no_reference: true,
        raw: String::new(),
    }
}
