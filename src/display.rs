//! 답변 출력 형식 (터미널 텍스트 / Markdown)

use std::fmt::Write;

use crate::core::orchestrator::PipelineRun;
use crate::core::types::CandidateRole;

/// 터미널과 txt 파일에 쓰는 답변 텍스트
pub fn render_answer(run: &PipelineRun) -> String {
    let draft = &run.answer.draft;
    let mut out = String::new();

    let _ = writeln!(out, "📌 요약:\n  {}\n", draft.summary);
    if !draft.detail.is_empty() {
        out.push_str("📝 상세 설명:\n");
        for (i, step) in draft.detail.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, step);
        }
        out.push('\n');
    }
    if !draft.tips.is_empty() {
        out.push_str("💡 작성 팁 및 주의사항:\n");
        for tip in &draft.tips {
            let _ = writeln!(out, "  - {}", tip);
        }
        out.push('\n');
    }
    if !draft.citations.is_empty() {
        out.push_str("📚 출처:\n");
        for (i, id) in draft.citations.iter().enumerate() {
            match run.candidates.get(id) {
                Some(c) => {
                    let _ = writeln!(
                        out,
                        "  [{}] {} ({}, 유사도 {:.2})",
                        i + 1,
                        id,
                        c.role.label(),
                        c.similarity_score
                    );
                }
                None => {
                    let _ = writeln!(out, "  [{}] {}", i + 1, id);
                }
            }
        }
        out.push('\n');
    }
    if !run.answer.caveat.is_empty() {
        out.push_str("⚠️ 참고:\n");
        for line in run.answer.caveat.lines() {
            let _ = writeln!(out, "  - {}", line);
        }
        out.push('\n');
    }
    let _ = write!(
        out,
        "참고 문서: 템플릿 {}건, 작성 예시 {}건, 관련 문서 {}건 | 신뢰도: {:.0}%",
        run.candidates.count_role(CandidateRole::Template),
        run.candidates.count_role(CandidateRole::Example),
        run.candidates.count_role(CandidateRole::Reference),
        draft.confidence * 100.0
    );
    out
}

/// md 파일용: 질문/분류 정보와 답변 섹션
pub fn render_markdown(run: &PipelineRun) -> String {
    let draft = &run.answer.draft;
    let mut md = String::new();

    let _ = writeln!(md, "# 인수인계 질의 결과\n");
    let _ = writeln!(md, "- **질문**: {}", run.question.text);
    let _ = writeln!(md, "- **의도**: {}", run.descriptor.category.label());
    let _ = writeln!(md, "- **긴급도**: {}", run.descriptor.urgency.label());
    if let Some(doc_type) = &run.descriptor.document_type_hint {
        let _ = writeln!(md, "- **문서 유형**: {}", doc_type);
    }
    let _ = writeln!(md, "- **시각**: {}\n", run.question.asked_at.format("%Y-%m-%d %H:%M:%S UTC"));

    let _ = writeln!(md, "## 📌 요약\n\n{}\n", draft.summary);
    if !draft.detail.is_empty() {
        let _ = writeln!(md, "## 📝 상세 설명\n");
        for (i, step) in draft.detail.iter().enumerate() {
            let _ = writeln!(md, "{}. {}", i + 1, step);
        }
        md.push('\n');
    }
    if !draft.tips.is_empty() {
        let _ = writeln!(md, "## 💡 작성 팁 및 주의사항\n");
        for tip in &draft.tips {
            let _ = writeln!(md, "- {}", tip);
        }
        md.push('\n');
    }
    if !draft.citations.is_empty() {
        let _ = writeln!(md, "## 📚 출처\n");
        for id in &draft.citations {
            let _ = writeln!(md, "- `{}`", id);
        }
        md.push('\n');
    }
    if !run.answer.caveat.is_empty() {
        let _ = writeln!(md, "> ⚠️ {}\n", run.answer.caveat.replace('\n', "\n> ⚠️ "));
    }
    let _ = writeln!(md, "_신뢰도: {:.0}%_", draft.confidence * 100.0);
    md
}
